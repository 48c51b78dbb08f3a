//! Record store boundary for the coordination engine.
//!
//! `CoordinationStore` abstracts the three project-scoped record families
//! (locks, jobs, notepad) plus session archives and the lock audit trail.
//! Implementations:
//!
//! - [`SqliteStore`]: durable, conditional writes enforced by the database
//! - [`LocalStore`]: in-memory with a JSON file snapshot
//! - [`MirroredStore`]: durable-first, serving reads from a local mirror when
//!   the durable store fails
//!
//! The two conditional primitives carry the engine's correctness under
//! concurrent engine instances: [`CoordinationStore::try_acquire_lock`] and
//! [`CoordinationStore::update_job`].

pub mod local;
pub mod mirrored;
pub mod sqlite;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use local::LocalStore;
pub use mirrored::MirroredStore;
pub use sqlite::SqliteStore;

use crate::{
    coordination::{
        job_status::JobStatus,
        jobs::Job,
        locks::{LockEvent, LockRecord, LockRequest},
    },
    domain::{AgentId, JobId, ProjectId},
    Result,
};

/// Result of the exact-path conditional acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock (new, refreshed, or taken over from a
    /// stale holder).
    Granted(LockRecord),
    /// A different agent holds a live lock on the exact path.
    Held(LockRecord),
}

/// Compare-and-set update of one job.
///
/// Applied only when the job's current status is one of `expect_status` and,
/// if `expect_assignee` is set, the job is assigned to that agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub expect_status: Vec<JobStatus>,
    pub expect_assignee: Option<AgentId>,
    pub status: JobStatus,
    /// New assignee; `None` keeps the current one.
    pub assigned_to: Option<AgentId>,
    /// New cancel reason; `None` keeps the current one.
    pub cancel_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobUpdate {
    /// `todo -> in_progress`, assigning `agent`.
    pub fn claim(agent: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            expect_status: JobStatus::sources_of(JobStatus::InProgress),
            expect_assignee: None,
            status: JobStatus::InProgress,
            assigned_to: Some(agent),
            cancel_reason: None,
            updated_at: now,
        }
    }

    /// `in_progress -> done`, only for the assignee.
    pub fn complete(agent: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            expect_status: JobStatus::sources_of(JobStatus::Done),
            expect_assignee: Some(agent),
            status: JobStatus::Done,
            assigned_to: None,
            cancel_reason: None,
            updated_at: now,
        }
    }

    /// `todo|in_progress -> cancelled`, regardless of owner.
    pub fn cancel(reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            expect_status: JobStatus::sources_of(JobStatus::Cancelled),
            expect_assignee: None,
            status: JobStatus::Cancelled,
            assigned_to: None,
            cancel_reason: Some(reason.into()),
            updated_at: now,
        }
    }

    /// Whether the guard holds for `job`.
    pub fn matches(&self, job: &Job) -> bool {
        self.expect_status.contains(&job.status)
            && self
                .expect_assignee
                .as_ref()
                .map_or(true, |agent| job.assigned_to.as_ref() == Some(agent))
    }

    /// Apply the update to an in-memory job.
    pub fn apply(&self, job: &mut Job) {
        job.status = self.status;
        if let Some(agent) = &self.assigned_to {
            job.assigned_to = Some(agent.clone());
        }
        if let Some(reason) = &self.cancel_reason {
            job.cancel_reason = Some(reason.clone());
        }
        job.updated_at = self.updated_at;
    }
}

/// An archived session notepad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArchive {
    pub project_id: ProjectId,
    pub archived_at: DateTime<Utc>,
    pub archive_path: String,
    pub content: String,
}

/// Persistence boundary for the coordination engine.
///
/// Every method is scoped by project id. Errors are store failures; absence
/// and failed guards are expressed in the return value.
#[async_trait::async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Id of the named project, created if absent.
    async fn resolve_project(&self, name: &str) -> Result<ProjectId>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // LOCKS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Every lock record of the project, stale ones included.
    async fn list_locks(&self, project: &ProjectId) -> Result<Vec<LockRecord>>;

    /// Acquire `request.file_path` for `request.agent_id` in one conditional
    /// write. Succeeds when the path is free, already held by the same agent,
    /// or held by a lock that is stale at `now`.
    async fn try_acquire_lock(
        &self,
        project: &ProjectId,
        request: &LockRequest,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<AcquireOutcome>;

    /// Delete the lock on the exact path, returning it.
    async fn delete_lock(&self, project: &ProjectId, file_path: &str)
        -> Result<Option<LockRecord>>;

    /// Delete every lock of the project, returning how many were removed.
    async fn delete_all_locks(&self, project: &ProjectId) -> Result<usize>;

    /// Delete locks last refreshed before `cutoff`, returning them.
    async fn delete_stale_locks(
        &self,
        project: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // JOBS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn insert_job(&self, job: &Job) -> Result<()>;

    async fn list_jobs(&self, project: &ProjectId) -> Result<Vec<Job>>;

    async fn get_job(&self, project: &ProjectId, id: &JobId) -> Result<Option<Job>>;

    /// Apply `update` iff its guard holds. Returns the updated job, or `None`
    /// when the job is missing or the guard failed.
    async fn update_job(
        &self,
        project: &ProjectId,
        id: &JobId,
        update: &JobUpdate,
    ) -> Result<Option<Job>>;

    /// Delete `done` and `cancelled` jobs, returning how many were removed.
    async fn purge_finished_jobs(&self, project: &ProjectId) -> Result<usize>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // NOTEPAD & ARCHIVES
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Notepad content, or `None` if the project has none yet.
    async fn read_notepad(&self, project: &ProjectId) -> Result<Option<String>>;

    /// Replace the notepad content.
    async fn write_notepad(&self, project: &ProjectId, content: &str) -> Result<()>;

    /// Append `text` to the notepad.
    ///
    /// The default is read-then-write, which can lose a concurrent append from
    /// another process. Stores with a server-side append override it.
    async fn append_notepad(&self, project: &ProjectId, text: &str) -> Result<()> {
        let current = self.read_notepad(project).await?.unwrap_or_default();
        self.write_notepad(project, &format!("{current}{text}")).await
    }

    async fn archive_session(&self, archive: &SessionArchive) -> Result<()>;

    /// Archives of the project, oldest first.
    async fn list_session_archives(&self, project: &ProjectId) -> Result<Vec<SessionArchive>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // LOCK AUDIT TRAIL
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn record_lock_event(&self, event: &LockEvent) -> Result<()>;

    /// Events created at or after `since`, oldest first.
    async fn list_lock_events(
        &self,
        project: &ProjectId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LockEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::jobs::NewJob;

    fn todo_job() -> Job {
        NewJob::new("task").into_job(
            JobId::parse("job-1").unwrap(),
            ProjectId::parse("proj").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_claim_guard_requires_todo() {
        let agent = AgentId::parse("agent-a").unwrap();
        let mut job = todo_job();
        let claim = JobUpdate::claim(agent.clone(), Utc::now());
        assert!(claim.matches(&job));

        claim.apply(&mut job);
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.assigned_to, Some(agent));
        assert!(!claim.matches(&job));
    }

    #[test]
    fn test_complete_guard_requires_assignee() {
        let owner = AgentId::parse("agent-a").unwrap();
        let other = AgentId::parse("agent-b").unwrap();
        let mut job = todo_job();
        JobUpdate::claim(owner.clone(), Utc::now()).apply(&mut job);

        assert!(!JobUpdate::complete(other, Utc::now()).matches(&job));
        let complete = JobUpdate::complete(owner.clone(), Utc::now());
        assert!(complete.matches(&job));
        complete.apply(&mut job);
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.assigned_to, Some(owner));
    }

    #[test]
    fn test_cancel_guard_rejects_finished_jobs() {
        let mut job = todo_job();
        let cancel = JobUpdate::cancel("obsolete", Utc::now());
        assert!(cancel.matches(&job));
        cancel.apply(&mut job);
        assert_eq!(job.cancel_reason.as_deref(), Some("obsolete"));
        assert!(!cancel.matches(&job));
    }
}
