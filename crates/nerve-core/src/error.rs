//! Error types for the coordination engine with categorization:
//!
//! - **Validation errors**: malformed input or configuration
//! - **System errors**: IO against snapshots and archives
//! - **Execution errors**: record store failures
//!
//! Lock conflicts, claim races, ownership mismatches and unknown jobs are *not*
//! errors. They come back as typed outcomes from the engine so callers can see
//! the current holder. An `Err` always means the operation did not happen.

pub mod execution;
pub mod system;
pub mod validation;

pub use execution::ExecutionError;
use std::fmt;
pub use system::SystemError;
pub use validation::ValidationError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type that can represent any error in the engine.
#[derive(Debug, Clone)]
pub enum Error {
    /// Validation error from input or configuration
    Validation(ValidationError),
    /// System error from IO
    System(SystemError),
    /// Execution error from the record store
    Execution(ExecutionError),
    /// Unknown error (fallback)
    Unknown(String),
}

impl Error {
    /// Create a validation error from an invalid config.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidConfig(msg.into()))
    }

    /// Create a validation error from a parse error.
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::ParseError(msg.into()))
    }

    /// Create a validation error from a validation failure.
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::ValidationError(msg.into()))
    }

    /// Create a system error from an IO error.
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::System(SystemError::IoError(msg.into()))
    }

    /// Create an execution error from a database failure.
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::DatabaseError(msg.into()))
    }

    /// Create an execution error for a store that cannot be reached.
    pub fn store_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::StoreUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        })
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::System(err) => err.code(),
            Self::Execution(err) => err.code(),
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::System(err) => write!(f, "{err}"),
            Self::Execution(err) => write!(f, "{err}"),
            Self::Unknown(msg) => write!(f, "Unknown error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::parse_error(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::parse_error(format!("Failed to parse config: {err}"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::database_error(err.to_string())
    }
}

impl From<crate::domain::IdentifierError> for Error {
    fn from(err: crate::domain::IdentifierError) -> Self {
        Self::validation_error(err.to_string())
    }
}
