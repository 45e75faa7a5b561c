use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrisAuthError {
    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("No eye detected")]
    NoEyeDetected,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Snapshot persist error: {0}")]
    Persist(String),

    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IrisAuthError>;
