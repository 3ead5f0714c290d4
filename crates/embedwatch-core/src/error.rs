//! Error types for Embedwatch Core

use thiserror::Error;

/// Result type alias for embed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Embed error types
///
/// Cloneable so that a single rejection can be observed by every waiter of a
/// [`Deferred`](crate::deferred::Deferred).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Construction errors
    #[error("No primary id or collection id provided")]
    MissingIdentifiers,

    #[error("Invalid embed address: {0}")]
    InvalidAddress(String),

    // Playback errors
    #[error("Player in frame {frame} reported an error status")]
    PlaybackFailed { frame: String },

    #[error("Embed failed permanently after {retries} retries")]
    RetriesExhausted { retries: u32 },

    // Transport errors
    #[error("Frame {frame} failed to load: {reason}")]
    FrameLoad { frame: String, reason: String },

    // Completion errors
    #[error("Pending completion was discarded by a reset")]
    Superseded,

    // Player API errors
    #[error("Player API error: {0}")]
    PlayerApi(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a player API error
    pub fn player_api(msg: impl Into<String>) -> Self {
        Error::PlayerApi(msg.into())
    }

    /// Returns true if the retry decision may act on this error.
    ///
    /// Construction errors are never retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::PlaybackFailed { .. } | Error::FrameLoad { .. })
    }

    /// Returns a stable error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MissingIdentifiers => "MISSING_IDS",
            Error::InvalidAddress(_) => "INVALID_ADDRESS",
            Error::PlaybackFailed { .. } => "PLAYBACK_FAILED",
            Error::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Error::FrameLoad { .. } => "FRAME_LOAD",
            Error::Superseded => "SUPERSEDED",
            Error::PlayerApi(_) => "PLAYER_API",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Internal(_) => "INTERNAL",
        }
    }
}
