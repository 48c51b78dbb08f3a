//! Durable-first store that degrades reads to a local mirror.
//!
//! Every successful durable read or write refreshes an in-memory mirror. When
//! a durable read fails, the last mirrored view is served instead and a
//! warning is logged. Writes are never redirected: a failed durable write is
//! returned to the caller as an error.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{AcquireOutcome, CoordinationStore, JobUpdate, LocalStore, SessionArchive};
use crate::{
    coordination::{
        jobs::Job,
        locks::{LockEvent, LockRecord, LockRequest},
    },
    domain::{JobId, ProjectId},
    Error, Result,
};

/// Durable store with a read-fallback mirror.
#[derive(Debug)]
pub struct MirroredStore<D> {
    durable: D,
    mirror: LocalStore,
}

impl<D: CoordinationStore> MirroredStore<D> {
    pub fn new(durable: D) -> Self {
        Self {
            durable,
            mirror: LocalStore::in_memory(),
        }
    }

    pub const fn durable(&self) -> &D {
        &self.durable
    }

    pub const fn mirror(&self) -> &LocalStore {
        &self.mirror
    }

    fn degraded(&self, operation: &str, error: &Error) {
        tracing::warn!(
            backend = self.durable.backend(),
            operation,
            code = error.code(),
            error = %error,
            "Durable read failed, serving local mirror"
        );
    }
}

/// Log a failed mirror update; the durable result stands.
fn mirrored<T>(operation: &str, result: Result<T>) {
    if let Err(e) = result {
        tracing::debug!(operation, error = %e, "Local mirror update failed");
    }
}

#[async_trait::async_trait]
impl<D: CoordinationStore> CoordinationStore for MirroredStore<D> {
    fn backend(&self) -> &'static str {
        self.durable.backend()
    }

    async fn resolve_project(&self, name: &str) -> Result<ProjectId> {
        self.durable.resolve_project(name).await
    }

    async fn list_locks(&self, project: &ProjectId) -> Result<Vec<LockRecord>> {
        match self.durable.list_locks(project).await {
            Ok(locks) => {
                self.mirror.replace_locks(project, locks.clone()).await;
                Ok(locks)
            }
            Err(e) => {
                self.degraded("list_locks", &e);
                self.mirror.list_locks(project).await
            }
        }
    }

    async fn try_acquire_lock(
        &self,
        project: &ProjectId,
        request: &LockRequest,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<AcquireOutcome> {
        let outcome = self
            .durable
            .try_acquire_lock(project, request, now, timeout)
            .await?;
        let (AcquireOutcome::Granted(lock) | AcquireOutcome::Held(lock)) = &outcome;
        self.mirror.put_lock(lock.clone()).await;
        Ok(outcome)
    }

    async fn delete_lock(
        &self,
        project: &ProjectId,
        file_path: &str,
    ) -> Result<Option<LockRecord>> {
        let removed = self.durable.delete_lock(project, file_path).await?;
        mirrored("delete_lock", self.mirror.delete_lock(project, file_path).await);
        Ok(removed)
    }

    async fn delete_all_locks(&self, project: &ProjectId) -> Result<usize> {
        let removed = self.durable.delete_all_locks(project).await?;
        mirrored("delete_all_locks", self.mirror.delete_all_locks(project).await);
        Ok(removed)
    }

    async fn delete_stale_locks(
        &self,
        project: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>> {
        let removed = self.durable.delete_stale_locks(project, cutoff).await?;
        mirrored(
            "delete_stale_locks",
            self.mirror.delete_stale_locks(project, cutoff).await,
        );
        Ok(removed)
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        self.durable.insert_job(job).await?;
        self.mirror.put_job(job.clone()).await;
        Ok(())
    }

    async fn list_jobs(&self, project: &ProjectId) -> Result<Vec<Job>> {
        match self.durable.list_jobs(project).await {
            Ok(jobs) => {
                self.mirror.replace_jobs(project, jobs.clone()).await;
                Ok(jobs)
            }
            Err(e) => {
                self.degraded("list_jobs", &e);
                self.mirror.list_jobs(project).await
            }
        }
    }

    async fn get_job(&self, project: &ProjectId, id: &JobId) -> Result<Option<Job>> {
        match self.durable.get_job(project, id).await {
            Ok(job) => {
                if let Some(job) = &job {
                    self.mirror.put_job(job.clone()).await;
                }
                Ok(job)
            }
            Err(e) => {
                self.degraded("get_job", &e);
                self.mirror.get_job(project, id).await
            }
        }
    }

    async fn update_job(
        &self,
        project: &ProjectId,
        id: &JobId,
        update: &JobUpdate,
    ) -> Result<Option<Job>> {
        let updated = self.durable.update_job(project, id, update).await?;
        if let Some(job) = &updated {
            self.mirror.put_job(job.clone()).await;
        }
        Ok(updated)
    }

    async fn purge_finished_jobs(&self, project: &ProjectId) -> Result<usize> {
        let purged = self.durable.purge_finished_jobs(project).await?;
        mirrored(
            "purge_finished_jobs",
            self.mirror.purge_finished_jobs(project).await,
        );
        Ok(purged)
    }

    async fn read_notepad(&self, project: &ProjectId) -> Result<Option<String>> {
        match self.durable.read_notepad(project).await {
            Ok(content) => {
                if let Some(content) = &content {
                    mirrored(
                        "read_notepad",
                        self.mirror.write_notepad(project, content).await,
                    );
                }
                Ok(content)
            }
            Err(e) => {
                self.degraded("read_notepad", &e);
                self.mirror.read_notepad(project).await
            }
        }
    }

    async fn write_notepad(&self, project: &ProjectId, content: &str) -> Result<()> {
        self.durable.write_notepad(project, content).await?;
        mirrored(
            "write_notepad",
            self.mirror.write_notepad(project, content).await,
        );
        Ok(())
    }

    async fn append_notepad(&self, project: &ProjectId, text: &str) -> Result<()> {
        self.durable.append_notepad(project, text).await?;
        mirrored(
            "append_notepad",
            self.mirror.append_notepad(project, text).await,
        );
        Ok(())
    }

    async fn archive_session(&self, archive: &SessionArchive) -> Result<()> {
        self.durable.archive_session(archive).await?;
        mirrored("archive_session", self.mirror.archive_session(archive).await);
        Ok(())
    }

    async fn list_session_archives(&self, project: &ProjectId) -> Result<Vec<SessionArchive>> {
        match self.durable.list_session_archives(project).await {
            Ok(archives) => Ok(archives),
            Err(e) => {
                self.degraded("list_session_archives", &e);
                self.mirror.list_session_archives(project).await
            }
        }
    }

    async fn record_lock_event(&self, event: &LockEvent) -> Result<()> {
        self.durable.record_lock_event(event).await?;
        mirrored(
            "record_lock_event",
            self.mirror.record_lock_event(event).await,
        );
        Ok(())
    }

    async fn list_lock_events(
        &self,
        project: &ProjectId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LockEvent>> {
        match self.durable.list_lock_events(project, since).await {
            Ok(events) => Ok(events),
            Err(e) => {
                self.degraded("list_lock_events", &e);
                self.mirror.list_lock_events(project, since).await
            }
        }
    }
}
