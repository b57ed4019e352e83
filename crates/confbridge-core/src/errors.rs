use std::fmt;

use thiserror::Error;

/// Errors returned at the command boundary.
#[derive(Debug, Error)]
pub enum ConfError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown video track: {0}")]
    TrackNotFound(String),
    #[error("sdk error: {0}")]
    Sdk(#[from] SdkError),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("settings error: {0}")]
    Settings(String),
}

/// Failures reported by the communications SDK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not connected: {0}")]
    NotConnected(String),
    #[error("internal sdk error: {0}")]
    Internal(String),
    #[error("{0}")]
    Other(String),
}

/// Coarse classification used by the error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotConnected,
    SdkInternal,
    Unknown,
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SdkError::NotConnected(_) => ErrorKind::NotConnected,
            SdkError::Internal(_) => ErrorKind::SdkInternal,
            SdkError::Other(_) => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::NotConnected => "not-connected",
            ErrorKind::SdkInternal => "sdk-internal",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
