use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced by the readiness bridge and the driver loop.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `select(2)` itself failed. The OS error is carried unclassified.
    #[error("socket wait failed: {0}")]
    Wait(#[from] std::io::Error),

    #[error("invalid socket descriptor: {0}")]
    InvalidDescriptor(i32),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("engine accepted zero bytes")]
    WriteZero,

    /// Error reported by the session engine (e.g. libssh2's last-error pair).
    #[error("engine error {code}: {message}")]
    Engine { code: i32, message: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Build an engine error from a code and message.
    pub fn engine(code: i32, message: impl Into<String>) -> Self {
        BridgeError::Engine {
            code,
            message: message.into(),
        }
    }

    /// The OS error code behind a failed wait, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            BridgeError::Wait(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Whether the wait was interrupted by a signal (`EINTR`).
    pub fn is_interrupted(&self) -> bool {
        matches!(self, BridgeError::Wait(e) if e.kind() == std::io::ErrorKind::Interrupted)
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
