//! Job records, claim-candidate selection and job operation outcomes.
//!
//! Candidate selection is pure: the engine loads the board, asks for the
//! ordered candidates, then walks them with a conditional claim until one
//! succeeds.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::job_status::{JobPriority, JobStatus};
use crate::{
    domain::{AgentId, JobId, ProjectId},
    Error, Result,
};

/// Returned by a claim when nothing is claimable.
pub const NO_OPEN_JOBS_MESSAGE: &str = "Relax. No open tickets (or dependencies not met).";

/// Returned by a claim when every candidate was taken by another agent mid-walk.
pub const ALL_CLAIMED_MESSAGE: &str = "All available jobs were just claimed.";

/// A unit of work on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub assigned_to: Option<AgentId>,
    pub dependencies: Vec<JobId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancel_reason: Option<String>,
}

impl Job {
    /// Sort key for claim order: priority rank, then oldest first, then id.
    pub fn claim_key(&self) -> (JobPriority, DateTime<Utc>, &str) {
        (self.priority, self.created_at, self.id.as_str())
    }
}

/// Input for posting a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub priority: JobPriority,
    pub dependencies: Vec<JobId>,
}

impl NewJob {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: JobPriority::default(),
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = JobId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    /// # Errors
    ///
    /// Returns a validation error when the title is blank.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation_error("job title cannot be empty"));
        }
        Ok(())
    }

    pub(crate) fn into_job(
        self,
        id: JobId,
        project_id: ProjectId,
        created_at: DateTime<Utc>,
    ) -> Job {
        Job {
            id,
            project_id,
            title: self.title.trim().to_string(),
            description: self.description,
            priority: self.priority,
            status: JobStatus::Todo,
            assigned_to: None,
            dependencies: self.dependencies.into_iter().unique().collect(),
            created_at,
            updated_at: created_at,
            cancel_reason: None,
        }
    }
}

/// Todo jobs whose every dependency is done, in claim order.
///
/// A dependency id that names no job on the board is never satisfied.
pub fn claim_candidates(jobs: &[Job]) -> Vec<&Job> {
    let status_by_id: HashMap<&JobId, JobStatus> =
        jobs.iter().map(|job| (&job.id, job.status)).collect();

    jobs.iter()
        .filter(|job| job.status == JobStatus::Todo)
        .filter(|job| {
            job.dependencies
                .iter()
                .all(|dep| status_by_id.get(dep) == Some(&JobStatus::Done))
        })
        .sorted_by(|a, b| a.claim_key().cmp(&b.claim_key()))
        .collect()
}

/// Ids in `dependencies` that name no job on the board.
pub fn unknown_dependencies<'a>(dependencies: &'a [JobId], jobs: &[Job]) -> Vec<&'a JobId> {
    dependencies
        .iter()
        .filter(|dep| !jobs.iter().any(|job| &job.id == *dep))
        .collect()
}

/// Result of `claim_next_job`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(Job),
    NoJobsAvailable { message: String },
}

impl ClaimOutcome {
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Claimed(_) => "CLAIMED",
            Self::NoJobsAvailable { .. } => "NO_JOBS_AVAILABLE",
        }
    }

    pub const fn job(&self) -> Option<&Job> {
        match self {
            Self::Claimed(job) => Some(job),
            Self::NoJobsAvailable { .. } => None,
        }
    }
}

/// Result of `complete_job`. Only `Completed` mutated anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed(Job),
    NotFound,
    /// The caller is not the assignee.
    NotOwner { assigned_to: Option<AgentId> },
    /// The caller owns the job but it is not in progress.
    InvalidState { status: JobStatus },
}

impl CompleteOutcome {
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Completed(_) => "COMPLETED",
            Self::NotFound => "NOT_FOUND",
            Self::NotOwner { .. } => "NOT_OWNER",
            Self::InvalidState { .. } => "INVALID_STATE",
        }
    }

    pub fn message(&self, job_id: &JobId) -> String {
        match self {
            Self::Completed(job) => format!("Job '{}' completed", job.title),
            Self::NotFound => format!("Job '{job_id}' not found"),
            Self::NotOwner {
                assigned_to: Some(owner),
            } => format!("Job '{job_id}' is assigned to '{owner}'"),
            Self::NotOwner { assigned_to: None } => {
                format!("Job '{job_id}' is not assigned to anyone")
            }
            Self::InvalidState { status } => {
                format!("Job '{job_id}' cannot be completed from status '{status}'")
            }
        }
    }
}

/// Result of `cancel_job`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(Job),
    NotFound,
    /// The job is already done or cancelled.
    AlreadyFinished { status: JobStatus },
}

impl CancelOutcome {
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Cancelled(_) => "CANCELLED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyFinished { .. } => "ALREADY_FINISHED",
        }
    }
}
