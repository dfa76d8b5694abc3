//! Error handling for the sitewatch engine

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame acquisition failure (transient, retried next tick)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Recording session failure (aborts the current event)
    #[error("Recording error: {0}")]
    Recording(String),

    /// Snapshot capture/annotation failure
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
