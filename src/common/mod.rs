pub mod config;
pub mod error;

pub use config::{Config, DetectorConfig, LocalizerConfig, MatcherConfig, ScanConfig, StorageConfig};
pub use error::{IrisAuthError, Result};
