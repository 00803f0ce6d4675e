//! Error types for sectorplay
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Closed channels and end-of-stream are deliberately *not* errors: those
//! surface as `Ok(None)` / `Ok(false)` returns so cancellation carries no
//! diagnostic. Fatal conditions (`StalledPeer`, `CapacityExceeded`) cascade a
//! full-session terminate.

use thiserror::Error;

/// Main error type for sectorplay
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chunk stream / frame reconstruction errors
    #[error("Demux error: {0}")]
    Demux(String),

    /// Codec failure on one frame or audio block
    #[error("Decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Video surface errors
    #[error("Video surface error: {0}")]
    VideoSurface(String),

    /// Playback pipeline errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// A queue wait detected that the producing/consuming peer thread died
    #[error("Stalled peer on queue '{queue}': {detail}")]
    StalledPeer {
        /// Queue name for diagnostics
        queue: &'static str,
        /// What the waiter observed
        detail: String,
    },

    /// A non-blocking add overflowed its bound (logic error upstream)
    #[error("Capacity exceeded on queue '{queue}': {detail}")]
    CapacityExceeded {
        /// Queue name for diagnostics
        queue: &'static str,
        /// What overflowed
        detail: String,
    },

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must cascade a full-session terminate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::StalledPeer { .. } | Error::CapacityExceeded { .. }
        )
    }
}

/// Convenience Result type using sectorplay Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::StalledPeer {
            queue: "frames",
            detail: "producer died".to_string()
        }
        .is_fatal());
        assert!(Error::CapacityExceeded {
            queue: "events",
            detail: "32 entries".to_string()
        }
        .is_fatal());
        assert!(!Error::Decode("bad frame".to_string()).is_fatal());
        assert!(!Error::Demux("gap".to_string()).is_fatal());
    }
}
