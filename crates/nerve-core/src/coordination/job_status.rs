//! Job Status State Machine (Pure Domain Logic)
//!
//! # State Machine
//!
//! ```text
//! todo -> in_progress -> done
//!   |          |
//!   v          v
//! cancelled  cancelled
//! ```
//!
//! Terminal states: `done`, `cancelled`

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STATE MACHINE ERROR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error type for invalid job state transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid state transition: cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JOB STATUS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle of a job on the board.
///
/// Valid transitions:
/// - todo -> `in_progress` (claim)
/// - `in_progress` -> done (completion by the assignee)
/// - `todo|in_progress` -> cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Posted and waiting for an agent.
    Todo,
    /// Claimed by the agent in `assigned_to`.
    InProgress,
    /// Completed by its assignee.
    Done,
    /// No longer wanted.
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if this status is terminal (purged at session finalize).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        self.validate_transition(target).is_ok()
    }

    /// Validates that a transition from `self` to `target` is allowed.
    pub fn validate_transition(&self, target: Self) -> std::result::Result<(), TransitionError> {
        let is_valid = match self {
            Self::Todo => matches!(target, Self::InProgress | Self::Cancelled),
            Self::InProgress => matches!(target, Self::Done | Self::Cancelled),
            Self::Done | Self::Cancelled => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError {
                from: *self,
                to: target,
            })
        }
    }

    /// Statuses from which a transition to `target` is allowed.
    #[must_use]
    pub fn sources_of(target: Self) -> Vec<Self> {
        Self::all()
            .iter()
            .copied()
            .filter(|status| status.can_transition_to(target))
            .collect()
    }

    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Todo, Self::InProgress, Self::Done, Self::Cancelled]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(Error::parse_error(format!("Invalid job status: {s}"))),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::from_str(&s)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JOB PRIORITY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Claim priority. Declaration order is claim order: `Critical` sorts first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum JobPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl JobPriority {
    /// Upper-case label used in notepad lines (`[HIGH]`).
    #[must_use]
    pub fn label(&self) -> String {
        self.to_string().to_uppercase()
    }
}
