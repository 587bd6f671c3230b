//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! `main` uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! Errors fall into three tiers:
//! - recovered locally and never surfaced (xruns, partial ring transfers,
//!   per-file tag failures during a scan),
//! - negative results the caller decides about (`load` failures, empty
//!   playlist navigation, misses from the find functions),
//! - fatal conditions that end the process (missing config, lock contention,
//!   a handle-table inconsistency, no usable PCM format).

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Tag reading/writing error
    #[error("Tag error: {0}")]
    Tag(#[from] crate::tags::TagError),

    /// Library index error
    #[error("Library error: {0}")]
    Library(#[from] crate::library::LibraryError),

    /// Audio engine error
    #[error("Engine error: {0}")]
    Engine(#[from] crate::player::EngineError),

    /// Playback service error
    #[error("Service error: {0}")]
    Service(#[from] crate::player::ServiceError),

    /// Config watcher error
    #[error("Watch error: {0}")]
    Watch(#[from] crate::config::watcher::WatchError),

    /// Single-instance gate error
    #[error("Instance error: {0}")]
    Instance(#[from] crate::instance::InstanceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::EngineError;

    #[test]
    fn test_error_display() {
        let err = Error::Engine(EngineError::NoAudioStream);
        assert!(err.to_string().contains("no audio stream"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
