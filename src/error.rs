//! Error types for the lifeline signal tree and its outer surfaces.

use thiserror::Error;

/// Why a signal node became done.
///
/// Set exactly once per node, atomically with the done transition. A node that is
/// not done reports no cause at all (`SignalNode::err` returns `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DoneCause {
    /// The node's release operation was invoked, or an ancestor was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The node's own or an inherited deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl DoneCause {
    pub(crate) fn as_code(self) -> u8 {
        match self {
            DoneCause::Cancelled => 1,
            DoneCause::DeadlineExceeded => 2,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DoneCause::Cancelled),
            2 => Some(DoneCause::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Errors raised by configuration, logging and the demonstration CLI.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
