//! Error kinds delivered to callers and packet completions.

use keeper_wire::{ErrorCode, WireError};
use thiserror::Error;

/// Session level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeeperError {
    /// The session is gone for good; a new one must be created
    #[error("session expired")]
    SessionExpired,

    /// The request was in flight when the connection dropped, its outcome is unknown
    #[error("connection lost")]
    ConnectionLost,

    /// The server rejected the session credentials
    #[error("authentication failed")]
    AuthFailed,

    /// An invariant of the protocol was violated
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Bad input at the call site
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server answered with a non-zero error code
    #[error("server error {0}")]
    Server(ErrorCode),

    /// A record could not be decoded or encoded
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The completion was dropped without an outcome
    #[error("operation dropped before completion")]
    Canceled,
}

impl KeeperError {
    /// Protocol error code equivalent of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            KeeperError::SessionExpired => ErrorCode::SessionExpired,
            KeeperError::ConnectionLost | KeeperError::Canceled => ErrorCode::ConnectionLoss,
            KeeperError::AuthFailed => ErrorCode::AuthFailed,
            KeeperError::Protocol(_) => ErrorCode::SystemError,
            KeeperError::InvalidArgument(_) => ErrorCode::BadArguments,
            KeeperError::Server(code) => *code,
            KeeperError::Wire(_) => ErrorCode::MarshallingError,
        }
    }

    /// True when the session can no longer be used
    pub fn is_terminal(&self) -> bool {
        matches!(self, KeeperError::SessionExpired | KeeperError::AuthFailed)
    }
}

impl From<ErrorCode> for KeeperError {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::SessionExpired => KeeperError::SessionExpired,
            ErrorCode::ConnectionLoss => KeeperError::ConnectionLost,
            ErrorCode::AuthFailed => KeeperError::AuthFailed,
            other => KeeperError::Server(other),
        }
    }
}

/// Result alias for session operations
pub type KeeperResult<T> = Result<T, KeeperError>;
