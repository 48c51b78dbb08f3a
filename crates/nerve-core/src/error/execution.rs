//! Execution error types for record store failures.
//!
//! A store error is surfaced to the caller as-is. The engine never converts one
//! into a success and never retries a conditional write on its own.

use std::fmt;

/// Execution errors represent problems with the durable or local record store.
#[derive(Debug, Clone)]
pub enum ExecutionError {
    /// Database operation failed
    DatabaseError(String),
    /// The configured backend could not be reached
    StoreUnavailable { backend: String, reason: String },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::StoreUnavailable { backend, reason } => {
                write!(f, "Store '{backend}' unavailable: {reason}")
            }
        }
    }
}

impl ExecutionError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
        }
    }
}
