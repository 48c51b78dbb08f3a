//! In-memory record store with a JSON file snapshot.
//!
//! Used when no durable store is configured or reachable. Memory is
//! authoritative: the snapshot is rewritten after every mutation, and a failed
//! snapshot write is logged rather than failing the operation. Correct for a
//! single process only.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{AcquireOutcome, CoordinationStore, JobUpdate, SessionArchive};
use crate::{
    coordination::{
        jobs::Job,
        lock_path::is_stale,
        locks::{LockEvent, LockRecord, LockRequest},
    },
    domain::{JobId, ProjectId},
    Error, Result,
};

/// Lock events kept per store; the oldest are dropped first.
pub const LOCAL_EVENT_RETENTION: usize = 5000;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    projects: BTreeMap<String, ProjectId>,
    #[serde(default)]
    locks: BTreeMap<ProjectId, BTreeMap<String, LockRecord>>,
    #[serde(default)]
    jobs: BTreeMap<ProjectId, BTreeMap<JobId, Job>>,
    #[serde(default)]
    notepads: BTreeMap<ProjectId, String>,
    #[serde(default)]
    archives: Vec<SessionArchive>,
    #[serde(default)]
    lock_events: Vec<LockEvent>,
}

/// Record store held in memory, optionally snapshotted to a file.
#[derive(Debug, Default)]
pub struct LocalStore {
    state: Mutex<Snapshot>,
    snapshot_path: Option<PathBuf>,
}

impl LocalStore {
    /// Store with no snapshot file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the snapshot at `path`, or start empty if it is missing or
    /// unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Snapshot unreadable, starting with empty state"
                );
                Snapshot::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read snapshot, starting with empty state"
                );
                Snapshot::default()
            }
        };
        Self {
            state: Mutex::new(snapshot),
            snapshot_path: Some(path),
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Replace every lock of `project` with `locks`.
    pub async fn replace_locks(&self, project: &ProjectId, locks: Vec<LockRecord>) {
        self.mutate(|state| {
            state.locks.insert(
                project.clone(),
                locks
                    .into_iter()
                    .map(|lock| (lock.file_path.clone(), lock))
                    .collect(),
            );
        })
        .await;
    }

    /// Replace every job of `project` with `jobs`.
    pub async fn replace_jobs(&self, project: &ProjectId, jobs: Vec<Job>) {
        self.mutate(|state| {
            state.jobs.insert(
                project.clone(),
                jobs.into_iter().map(|job| (job.id.clone(), job)).collect(),
            );
        })
        .await;
    }

    /// Insert or replace one lock.
    pub async fn put_lock(&self, lock: LockRecord) {
        self.mutate(|state| {
            state
                .locks
                .entry(lock.project_id.clone())
                .or_default()
                .insert(lock.file_path.clone(), lock);
        })
        .await;
    }

    /// Insert or replace one job.
    pub async fn put_job(&self, job: Job) {
        self.mutate(|state| {
            state
                .jobs
                .entry(job.project_id.clone())
                .or_default()
                .insert(job.id.clone(), job);
        })
        .await;
    }

    /// Apply `f` to the state under the lock, then persist the snapshot.
    async fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> T {
        let mut state = self.state.lock().await;
        let result = f(&mut state);
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = persist(path, &state).await {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to persist local snapshot"
                );
            }
        }
        result
    }

    async fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        let state = self.state.lock().await;
        f(&state)
    }
}

/// Write the snapshot to a temp file beside `path`, then rename over it.
async fn persist(path: &Path, state: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::io_error(format!("Failed to replace {}: {e}", path.display())))
}

#[async_trait::async_trait]
impl CoordinationStore for LocalStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn resolve_project(&self, name: &str) -> Result<ProjectId> {
        let candidate = ProjectId::parse(format!("local-{name}"))?;
        Ok(self
            .mutate(|state| {
                state
                    .projects
                    .entry(name.to_string())
                    .or_insert(candidate)
                    .clone()
            })
            .await)
    }

    async fn list_locks(&self, project: &ProjectId) -> Result<Vec<LockRecord>> {
        Ok(self
            .read(|state| {
                state
                    .locks
                    .get(project)
                    .map(|locks| locks.values().cloned().collect())
                    .unwrap_or_default()
            })
            .await)
    }

    async fn try_acquire_lock(
        &self,
        project: &ProjectId,
        request: &LockRequest,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<AcquireOutcome> {
        Ok(self
            .mutate(|state| {
                let locks = state.locks.entry(project.clone()).or_default();
                match locks.get(&request.file_path) {
                    Some(current)
                        if current.agent_id != request.agent_id
                            && !is_stale(current.updated_at, now, timeout) =>
                    {
                        AcquireOutcome::Held(current.clone())
                    }
                    _ => {
                        let record = request.clone().into_record(project.clone(), now);
                        locks.insert(record.file_path.clone(), record.clone());
                        AcquireOutcome::Granted(record)
                    }
                }
            })
            .await)
    }

    async fn delete_lock(
        &self,
        project: &ProjectId,
        file_path: &str,
    ) -> Result<Option<LockRecord>> {
        Ok(self
            .mutate(|state| {
                state
                    .locks
                    .get_mut(project)
                    .and_then(|locks| locks.remove(file_path))
            })
            .await)
    }

    async fn delete_all_locks(&self, project: &ProjectId) -> Result<usize> {
        Ok(self
            .mutate(|state| state.locks.remove(project).map_or(0, |locks| locks.len()))
            .await)
    }

    async fn delete_stale_locks(
        &self,
        project: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>> {
        Ok(self
            .mutate(|state| {
                let Some(locks) = state.locks.get_mut(project) else {
                    return Vec::new();
                };
                let (stale, live): (BTreeMap<_, _>, BTreeMap<_, _>) =
                    std::mem::take(locks)
                        .into_iter()
                        .partition(|(_, lock)| lock.updated_at < cutoff);
                *locks = live;
                stale.into_values().collect()
            })
            .await)
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        let inserted = self
            .mutate(|state| {
                let jobs = state.jobs.entry(job.project_id.clone()).or_default();
                if jobs.contains_key(&job.id) {
                    false
                } else {
                    jobs.insert(job.id.clone(), job.clone());
                    true
                }
            })
            .await;
        if inserted {
            Ok(())
        } else {
            Err(Error::validation_error(format!(
                "Job '{}' already exists",
                job.id
            )))
        }
    }

    async fn list_jobs(&self, project: &ProjectId) -> Result<Vec<Job>> {
        Ok(self
            .read(|state| {
                let mut jobs: Vec<Job> = state
                    .jobs
                    .get(project)
                    .map(|jobs| jobs.values().cloned().collect())
                    .unwrap_or_default();
                jobs.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
                jobs
            })
            .await)
    }

    async fn get_job(&self, project: &ProjectId, id: &JobId) -> Result<Option<Job>> {
        Ok(self
            .read(|state| state.jobs.get(project).and_then(|jobs| jobs.get(id)).cloned())
            .await)
    }

    async fn update_job(
        &self,
        project: &ProjectId,
        id: &JobId,
        update: &JobUpdate,
    ) -> Result<Option<Job>> {
        Ok(self
            .mutate(|state| {
                let job = state.jobs.get_mut(project)?.get_mut(id)?;
                if !update.matches(job) {
                    return None;
                }
                update.apply(job);
                Some(job.clone())
            })
            .await)
    }

    async fn purge_finished_jobs(&self, project: &ProjectId) -> Result<usize> {
        Ok(self
            .mutate(|state| {
                state.jobs.get_mut(project).map_or(0, |jobs| {
                    let before = jobs.len();
                    jobs.retain(|_, job| !job.status.is_terminal());
                    before - jobs.len()
                })
            })
            .await)
    }

    async fn read_notepad(&self, project: &ProjectId) -> Result<Option<String>> {
        Ok(self.read(|state| state.notepads.get(project).cloned()).await)
    }

    async fn write_notepad(&self, project: &ProjectId, content: &str) -> Result<()> {
        self.mutate(|state| {
            state.notepads.insert(project.clone(), content.to_string());
        })
        .await;
        Ok(())
    }

    async fn archive_session(&self, archive: &SessionArchive) -> Result<()> {
        self.mutate(|state| state.archives.push(archive.clone())).await;
        Ok(())
    }

    async fn list_session_archives(&self, project: &ProjectId) -> Result<Vec<SessionArchive>> {
        Ok(self
            .read(|state| {
                state
                    .archives
                    .iter()
                    .filter(|archive| &archive.project_id == project)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn record_lock_event(&self, event: &LockEvent) -> Result<()> {
        self.mutate(|state| {
            state.lock_events.push(event.clone());
            let excess = state.lock_events.len().saturating_sub(LOCAL_EVENT_RETENTION);
            if excess > 0 {
                state.lock_events = state.lock_events.split_off(excess);
            }
        })
        .await;
        Ok(())
    }

    async fn list_lock_events(
        &self,
        project: &ProjectId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LockEvent>> {
        Ok(self
            .read(|state| {
                state
                    .lock_events
                    .iter()
                    .filter(|event| &event.project_id == project && event.created_at >= since)
                    .cloned()
                    .collect()
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::{coordination::jobs::NewJob, domain::AgentId};

    const TIMEOUT: Duration = Duration::from_secs(1800);

    fn request(path: &str, agent: &str) -> LockRequest {
        LockRequest {
            file_path: path.to_string(),
            agent_id: AgentId::parse(agent).unwrap(),
            intent: "edit".to_string(),
            user_prompt: String::new(),
        }
    }

    #[tokio::test]
    async fn test_acquire_replaces_only_the_stale_holder() -> Result<()> {
        let store = LocalStore::in_memory();
        let project = store.resolve_project("default").await?;
        let old = Utc::now() - TimeDelta::seconds(4000);
        store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), old, TIMEOUT)
            .await?;
        store
            .try_acquire_lock(&project, &request("src/z.rs", "agent-a"), old, TIMEOUT)
            .await?;

        let outcome = store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-b"), Utc::now(), TIMEOUT)
            .await?;
        assert!(matches!(outcome, AcquireOutcome::Granted(_)));
        let locks = store.list_locks(&project).await?;
        assert_eq!(locks.len(), 2);
        assert!(locks
            .iter()
            .any(|lock| lock.file_path == "src/a.rs" && lock.agent_id.as_str() == "agent-b"));

        let fresh = store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-c"), Utc::now(), TIMEOUT)
            .await?;
        assert!(matches!(fresh, AcquireOutcome::Held(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state/nerve-center-state.json");
        {
            let store = LocalStore::open(&path).await;
            let project = store.resolve_project("default").await?;
            store
                .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), Utc::now(), TIMEOUT)
                .await?;
            store.append_notepad(&project, "hello").await?;
        }

        let reopened = LocalStore::open(&path).await;
        let project = reopened.resolve_project("default").await?;
        assert_eq!(reopened.list_locks(&project).await?.len(), 1);
        assert_eq!(
            reopened.read_notepad(&project).await?.as_deref(),
            Some("hello")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json")?;
        let store = LocalStore::open(&path).await;
        let project = store.resolve_project("default").await?;
        assert!(store.list_locks(&project).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_job_insert_is_rejected() -> Result<()> {
        let store = LocalStore::in_memory();
        let project = store.resolve_project("default").await?;
        let job = NewJob::new("task").into_job(JobId::generate(), project, Utc::now());
        store.insert_job(&job).await?;
        assert!(store.insert_job(&job).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_event_retention_drops_oldest() -> Result<()> {
        let store = LocalStore::in_memory();
        let project = store.resolve_project("default").await?;
        let start = Utc::now() - TimeDelta::hours(1);
        for i in 0..(LOCAL_EVENT_RETENTION + 3) {
            store
                .record_lock_event(&LockEvent {
                    project_id: project.clone(),
                    kind: crate::coordination::locks::LockEventKind::Granted,
                    file_path: format!("src/{i}.rs"),
                    requesting_agent: "agent-a".to_string(),
                    blocking_agent: None,
                    detail: None,
                    created_at: start,
                })
                .await?;
        }
        let events = store.list_lock_events(&project, start).await?;
        assert_eq!(events.len(), LOCAL_EVENT_RETENTION);
        assert_eq!(events[0].file_path, "src/3.rs");
        Ok(())
    }
}
