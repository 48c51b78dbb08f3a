//! Semantic newtypes for domain identifiers
//!
//! # Parse-at-Boundaries Pattern
//!
//! Each identifier type:
//! - Trims whitespace before validation (boundary sanitization)
//! - Validates its input on construction
//! - Cannot represent invalid states
//! - Deserializes through the same validation (`serde(try_from = "String")`)

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum agent id length accepted at the boundary.
pub const MAX_AGENT_ID_LEN: usize = 200;

/// Maximum job id length accepted at the boundary.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Maximum project id length accepted at the boundary.
pub const MAX_PROJECT_ID_LEN: usize = 300;

// ============================================================================
// ERRORS
// ============================================================================

/// Unified validation error for every identifier type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// Identifier is empty or whitespace-only
    #[error("{kind} cannot be empty")]
    Empty {
        /// Which identifier was being parsed
        kind: &'static str,
    },

    /// Identifier exceeds maximum length
    #[error("{kind} too long: {actual} characters (max {max})")]
    TooLong {
        kind: &'static str,
        max: usize,
        actual: usize,
    },

    /// Identifier contains control characters or NUL bytes
    #[error("{kind} contains invalid characters: {details}")]
    InvalidCharacters {
        kind: &'static str,
        details: String,
    },
}

fn validate(kind: &'static str, value: &str, max: usize) -> Result<(), IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }

    let actual = value.chars().count();
    if actual > max {
        return Err(IdentifierError::TooLong { kind, max, actual });
    }

    if value.chars().any(char::is_control) {
        return Err(IdentifierError::InvalidCharacters {
            kind,
            details: format!("'{}' contains control characters", value.escape_debug()),
        });
    }

    Ok(())
}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate the identifier.
            ///
            /// # Errors
            ///
            /// Returns `IdentifierError` if the trimmed value is empty, too
            /// long, or contains control characters.
            pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                let trimmed = value.trim();
                validate($kind, trimmed, $max)?;
                Ok(Self(trimmed.to_string()))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = IdentifierError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_identifier!(
    /// Identity of an agent process taking part in coordination.
    AgentId,
    "agent id",
    MAX_AGENT_ID_LEN
);

string_identifier!(
    /// Identifier of a job on the job board.
    JobId,
    "job id",
    MAX_JOB_ID_LEN
);

string_identifier!(
    /// Opaque project identifier; every record family is partitioned by it.
    ProjectId,
    "project id",
    MAX_PROJECT_ID_LEN
);

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Suffix unique within this process and, with overwhelming likelihood,
/// across processes: wall-clock nanos, process id and a sequence number.
fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{:x}-{seq}", std::process::id())
}

impl JobId {
    /// Fresh job id (`job-<nanos>-<pid>-<seq>`).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("job-{}", unique_suffix()))
    }
}

impl ProjectId {
    /// Fresh project id for a durable store.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("proj-{}", unique_suffix()))
    }
}
