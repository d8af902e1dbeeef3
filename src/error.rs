//! Error types for the jawbone bridge

use thiserror::Error;

use crate::transport::packet::FrameError;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the bridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (unrecoverable at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed datagram (dropped, never fatal)
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Sample-rate conversion failure (chunk discarded)
    #[error("resample error: {0}")]
    Resample(String),

    /// Local datagram transport failure (logged and retried)
    #[error("transport error: {0}")]
    Transport(String),

    /// Cloud session failure (triggers reconnect with backoff)
    #[error("session error: {0}")]
    Session(String),

    /// Control channel failure (publish dropped, never fatal)
    #[error("control error: {0}")]
    Control(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
