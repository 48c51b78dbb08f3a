//! Validation error types for configuration and input validation.
//!
//! These errors represent caller input or configuration problems that are
//! rejected before any state is touched.

use std::fmt;

/// Validation errors represent incorrect caller input or configuration.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid configuration provided
    InvalidConfig(String),
    /// Parse error when reading configuration or stored data
    ParseError(String),
    /// Generic validation error
    ValidationError(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl ValidationError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }
}
