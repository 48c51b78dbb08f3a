//! System error types for IO against the snapshot file and session archives.

use std::fmt;

/// System errors represent failures in IO outside the record store.
#[derive(Debug, Clone)]
pub enum SystemError {
    /// IO operation failed
    IoError(String),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl SystemError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::IoError(_) => "IO_ERROR",
        }
    }
}
