//! Error types for probes and the usage log.
//!
//! None of these ever abort a sampling cycle: the engine turns them into the
//! probe's fallback value and logs them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed data: {0}")]
    Parse(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),
    #[error("source lock poisoned")]
    Poisoned,
    #[error("probe task panicked: {0}")]
    Panicked(String),
    #[error("probe timed out after {0:?}")]
    TimedOut(std::time::Duration),
    #[error("previous call still running")]
    Stalled,
}

impl ProbeError {
    pub fn parse(msg: impl Into<String>) -> Self {
        ProbeError::Parse(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        ProbeError::Unavailable(msg.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ProbeError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ProbeError::Poisoned
    }
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("usage log unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("usage log is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}
