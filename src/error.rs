use std::time::Duration;

use thiserror::Error;

use crate::art::ArtError;
use crate::security::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the generation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected by validation; the message is meant for the user.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Too many {feature} requests, try again in {}s", .retry_after.as_secs().max(1))]
    RateLimited { feature: String, retry_after: Duration },

    #[error("Content does not fit in a QR code ({0} bytes)")]
    DataTooLong(usize),

    #[error(
        "Batch holds {0} entries; at most {max} are allowed",
        max = crate::generator::MAX_BATCH_SIZE
    )]
    BatchTooLarge(usize),

    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("Invalid colors: {0}")]
    Colors(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Art(#[from] ArtError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
