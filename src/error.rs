//! Error types for the live view client.

/// Top-level error type for the live view client.
///
/// Streaming failures never surface through this type: they show up as a
/// connection state on the owning manager. Only synchronous boundaries
/// (mode requests, configuration, media listing) return it.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// Camera mode outside `Primary`, `Secondary`, `Combined`.
    #[error("invalid camera mode: {0}")]
    InvalidMode(String),

    /// Image payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Recent-media collaborator failed.
    #[error("media listing error: {0}")]
    Media(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LiveError>;
