use irisauth::{common::Config, IrisService};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "irisauth")]
#[command(about = "Iris biometric authentication service")]
struct Cli {
    /// Path to the TOML config file (built-in defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from an image file
    Enroll {
        #[arg(short, long)]
        identity: String,
        #[arg(short = 'f', long)]
        image: PathBuf,
    },
    /// Authenticate an identity against an image file
    Authenticate {
        #[arg(short, long)]
        identity: String,
        #[arg(short = 'f', long)]
        image: PathBuf,
    },
    /// Remove an enrolled identity
    Remove {
        #[arg(short, long)]
        identity: String,
    },
    /// List enrolled identities
    List,
    /// Show enrollment count and threshold
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = Config::load_or_default(cli.config.as_deref())?;
    let service = IrisService::new(&config)?;

    match cli.command {
        Commands::Enroll { identity, image } => {
            let frame = load_frame(&image)?;
            let report = service.enroll(&identity, &frame);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                std::process::exit(1);
            }
        }
        Commands::Authenticate { identity, image } => {
            let frame = load_frame(&image)?;
            let report = service.authenticate(&identity, &frame);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.authenticated {
                std::process::exit(1);
            }
        }
        Commands::Remove { identity } => {
            let report = service.remove(&identity);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                std::process::exit(1);
            }
        }
        Commands::List => {
            println!("{}", serde_json::to_string_pretty(&service.identities())?);
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&service.status())?);
        }
    }

    Ok(())
}

fn load_frame(path: &PathBuf) -> Result<image::DynamicImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(IrisService::decode_frame(&bytes)?)
}

fn setup_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
