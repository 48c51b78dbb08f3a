//! `NerveCenter`: the serialized operation surface of the coordination engine.
//!
//! Every mutating operation runs behind one per-engine async mutex, so the
//! in-process order of operations is deterministic. Correctness across
//! engine instances rests on the store's conditional writes
//! ([`CoordinationStore::try_acquire_lock`], [`CoordinationStore::update_job`]).

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tokio::{io::AsyncWriteExt, sync::Mutex, task::JoinHandle};

use super::{
    context::render_live_context,
    job_status::JobStatus,
    jobs::{
        claim_candidates, unknown_dependencies, CancelOutcome, ClaimOutcome, CompleteOutcome,
        Job, NewJob, ALL_CLAIMED_MESSAGE, NO_OPEN_JOBS_MESSAGE,
    },
    lock_path::{check_input, check_scope, is_stale, normalize, overlaps, stale_cutoff},
    locks::{
        window_start, LockEvent, LockEventKind, LockEventStats, LockRecord, LockRequest,
        ProposeOutcome, ReleaseOutcome,
    },
    notepad::{
        archive_file_name, iso_timestamp, session_start_marker, Broadcaster, NotepadEntry,
        NotepadEvent,
    },
};
use crate::{
    config::Config,
    domain::{AgentId, JobId, ProjectId},
    store::{
        AcquireOutcome, CoordinationStore, JobUpdate, LocalStore, MirroredStore,
        SessionArchive, SqliteStore,
    },
    Error, Result,
};

/// Requesting agent recorded for force unlocks.
const ADMIN_AGENT: &str = "admin";

/// Requesting agent recorded for expiry.
const SYSTEM_AGENT: &str = "system";

/// Suffixed names tried before an archive write gives up.
const MAX_ARCHIVE_ATTEMPTS: u32 = 100;

/// Result of `finalize_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFinalized {
    pub archive_path: PathBuf,
    pub locks_cleared: usize,
    pub jobs_purged: usize,
}

impl SessionFinalized {
    pub const fn status(&self) -> &'static str {
        "SESSION_FINALIZED"
    }
}

#[derive(Debug, Default)]
struct OpState {
    last_created_at: Option<DateTime<Utc>>,
}

impl OpState {
    /// Strictly increasing job creation time at millisecond precision.
    fn next_created_at(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(3);
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + TimeDelta::milliseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }
}

/// The coordination engine for one project.
pub struct NerveCenter {
    store: Arc<dyn CoordinationStore>,
    project_id: ProjectId,
    config: Config,
    op_lock: Mutex<OpState>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
}

impl std::fmt::Debug for NerveCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NerveCenter")
            .field("backend", &self.store.backend())
            .field("project_id", &self.project_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NerveCenter {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // CONSTRUCTION
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Open an engine, choosing the backend once for its lifetime.
    ///
    /// With a `database_url`, the durable `SQLite` store is used (behind a
    /// read-fallback mirror) if it can be opened and the project resolved.
    /// Otherwise the engine runs on the local store snapshotted to
    /// `state_file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the local store cannot
    /// resolve the project.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn CoordinationStore> = match config.database_url.as_deref() {
            Some(url) => match Self::connect_durable(url, &config.project_name).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(
                        code = e.code(),
                        error = %e,
                        state_file = %config.state_file.display(),
                        "Durable store unavailable, falling back to local store"
                    );
                    Arc::new(LocalStore::open(config.state_file.clone()).await)
                }
            },
            None => Arc::new(LocalStore::open(config.state_file.clone()).await),
        };

        Self::with_store(store, config).await
    }

    async fn connect_durable(url: &str, project_name: &str) -> Result<MirroredStore<SqliteStore>> {
        let store = MirroredStore::new(SqliteStore::connect(url).await?);
        store.resolve_project(project_name.trim()).await?;
        Ok(store)
    }

    /// Build an engine on an explicit store.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the store fails to
    /// resolve the project or seed its notepad.
    pub async fn with_store(store: Arc<dyn CoordinationStore>, config: Config) -> Result<Self> {
        config.validate()?;
        let project_id = store.resolve_project(config.project_name.trim()).await?;

        if store.read_notepad(&project_id).await?.is_none() {
            store
                .write_notepad(&project_id, &session_start_marker(Utc::now()))
                .await?;
        }

        tracing::info!(
            backend = store.backend(),
            project_id = %project_id,
            "Nerve center ready"
        );

        Ok(Self {
            store,
            project_id,
            config,
            op_lock: Mutex::new(OpState::default()),
            broadcaster: None,
        })
    }

    /// Publish every notepad append to `broadcaster`.
    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub const fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Name of the backend chosen at construction.
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // LOCK MANAGER
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Ask for exclusive access to `file_path`.
    ///
    /// Conflicts come back as outcomes carrying the current holder: an exact
    /// path held by another agent is `RequiresOrchestration`, an overlapping
    /// ancestor or descendant lock and a too-broad path are `Denied`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for NUL bytes or an overlong path, and any
    /// store failure. A store failure is never reported as a grant.
    pub async fn propose_access(
        &self,
        agent_id: &AgentId,
        file_path: &str,
        intent: &str,
        user_prompt: &str,
    ) -> Result<ProposeOutcome> {
        check_input(file_path)?;
        let key = match check_scope(file_path) {
            Ok(key) => key,
            Err(rejection) => {
                let outcome = ProposeOutcome::Denied {
                    current: None,
                    reason: rejection.to_string(),
                };
                self.audit_blocked(agent_id, &normalize(file_path), intent, &outcome)
                    .await;
                return Ok(outcome);
            }
        };

        let _guard = self.op_lock.lock().await;
        let now = Utc::now();
        let timeout = self.config.lock_timeout();
        self.expire_stale_locks(now).await?;

        let conflict = self
            .store
            .list_locks(&self.project_id)
            .await?
            .into_iter()
            .filter(|lock| &lock.agent_id != agent_id)
            .filter(|lock| !is_stale(lock.updated_at, now, timeout))
            .find(|lock| overlaps(&key, &normalize(&lock.file_path)));

        if let Some(current) = conflict {
            let outcome = if normalize(&current.file_path) == key {
                ProposeOutcome::held_by_other(current)
            } else {
                ProposeOutcome::overlapping(file_path.trim(), current)
            };
            self.audit_blocked(agent_id, &key, intent, &outcome).await;
            return Ok(outcome);
        }

        let request = LockRequest {
            file_path: key,
            agent_id: agent_id.clone(),
            intent: intent.to_string(),
            user_prompt: user_prompt.to_string(),
        };

        match self
            .store
            .try_acquire_lock(&self.project_id, &request, now, timeout)
            .await?
        {
            AcquireOutcome::Granted(lock) => {
                self.append(NotepadEntry::LockGranted {
                    agent: lock.agent_id.as_str(),
                    path: &lock.file_path,
                    intent: &lock.intent,
                    prompt: &lock.user_prompt,
                })
                .await?;
                self.audit(LockEvent {
                    project_id: self.project_id.clone(),
                    kind: LockEventKind::Granted,
                    file_path: lock.file_path.clone(),
                    requesting_agent: lock.agent_id.to_string(),
                    blocking_agent: None,
                    detail: Some(lock.intent.clone()).filter(|i| !i.is_empty()),
                    created_at: now,
                })
                .await;
                tracing::info!(agent_id = %lock.agent_id, file_path = %lock.file_path, "Lock granted");
                Ok(ProposeOutcome::Granted(lock))
            }
            AcquireOutcome::Held(current) => {
                tracing::debug!(
                    agent_id = %agent_id,
                    file_path = %current.file_path,
                    holder = %current.agent_id,
                    "Exact-path acquire lost to another agent"
                );
                let outcome = ProposeOutcome::held_by_other(current);
                self.audit_blocked(agent_id, &request.file_path, intent, &outcome)
                    .await;
                Ok(outcome)
            }
        }
    }

    /// Delete the lock on `file_path`, whoever holds it.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed path, or a store failure.
    pub async fn release(&self, file_path: &str) -> Result<ReleaseOutcome> {
        check_input(file_path)?;
        let key = normalize(file_path);

        let _guard = self.op_lock.lock().await;
        let previous = self.store.delete_lock(&self.project_id, &key).await?;

        if let Some(lock) = &previous {
            self.audit(LockEvent {
                project_id: self.project_id.clone(),
                kind: LockEventKind::Released,
                file_path: key.clone(),
                requesting_agent: lock.agent_id.to_string(),
                blocking_agent: None,
                detail: None,
                created_at: Utc::now(),
            })
            .await;
            tracing::info!(agent_id = %lock.agent_id, file_path = %key, "Lock released");
        }

        Ok(ReleaseOutcome { previous })
    }

    /// Delete the lock on `file_path` regardless of holder. The admin notepad
    /// entry is appended even when nothing was locked.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed path, or a store failure.
    pub async fn force_unlock(&self, file_path: &str, reason: &str) -> Result<ReleaseOutcome> {
        check_input(file_path)?;
        let key = normalize(file_path);

        let _guard = self.op_lock.lock().await;
        let previous = self.store.delete_lock(&self.project_id, &key).await?;
        self.append(NotepadEntry::ForceUnlocked { path: &key, reason })
            .await?;

        let holder = previous.as_ref().map(|lock| lock.agent_id.to_string());
        self.audit(LockEvent {
            project_id: self.project_id.clone(),
            kind: LockEventKind::ForceUnlocked,
            file_path: key.clone(),
            requesting_agent: ADMIN_AGENT.to_string(),
            blocking_agent: holder.clone(),
            detail: Some(reason.to_string()),
            created_at: Utc::now(),
        })
        .await;
        tracing::warn!(
            file_path = %key,
            holder = holder.as_deref().unwrap_or_default(),
            reason,
            "Force unlock"
        );

        Ok(ReleaseOutcome { previous })
    }

    /// Delete every stale lock, noting each expiry in the notepad.
    ///
    /// `propose_access` runs the same sweep first. Reads never depend on it:
    /// stale locks are already ignored by `locks` and `live_context`.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn sweep_stale_locks(&self) -> Result<Vec<LockRecord>> {
        let _guard = self.op_lock.lock().await;
        self.expire_stale_locks(Utc::now()).await
    }

    /// Delete and note every lock stale at `now`. Callers hold the op lock.
    async fn expire_stale_locks(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>> {
        let expired = self
            .store
            .delete_stale_locks(&self.project_id, stale_cutoff(now, self.config.lock_timeout()))
            .await?;

        for lock in &expired {
            self.append(NotepadEntry::LockExpired {
                path: &lock.file_path,
                agent: lock.agent_id.as_str(),
            })
            .await?;
            self.audit(LockEvent {
                project_id: self.project_id.clone(),
                kind: LockEventKind::Expired,
                file_path: lock.file_path.clone(),
                requesting_agent: SYSTEM_AGENT.to_string(),
                blocking_agent: Some(lock.agent_id.to_string()),
                detail: None,
                created_at: now,
            })
            .await;
            tracing::warn!(file_path = %lock.file_path, agent_id = %lock.agent_id, "Lock expired");
        }

        Ok(expired)
    }

    /// Run [`Self::sweep_stale_locks`] every `interval` until the engine is
    /// dropped.
    pub fn spawn_stale_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if let Err(e) = engine.sweep_stale_locks().await {
                    tracing::error!(code = e.code(), error = %e, "Stale lock sweep failed");
                }
            }
        })
    }

    /// Start the sweeper if `sweep_interval_secs` is non-zero.
    pub fn spawn_configured_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.config
            .sweep_interval()
            .map(|interval| self.spawn_stale_sweeper(interval))
    }

    /// Locks that are live now.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn locks(&self) -> Result<Vec<LockRecord>> {
        let now = Utc::now();
        let timeout = self.config.lock_timeout();
        Ok(self
            .store
            .list_locks(&self.project_id)
            .await?
            .into_iter()
            .filter(|lock| !is_stale(lock.updated_at, now, timeout))
            .collect())
    }

    /// Lock activity over the last `days` UTC days, clamped to
    /// [`MAX_STATS_DAYS`](super::locks::MAX_STATS_DAYS).
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn lock_event_stats(&self, days: u32) -> Result<LockEventStats> {
        let now = Utc::now();
        let events = self
            .store
            .list_lock_events(&self.project_id, window_start(now, days))
            .await?;
        Ok(LockEventStats::compute(&events, now, days))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // JOB BOARD
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Post a `todo` job.
    ///
    /// Dependencies naming no known job are accepted; such a job stays
    /// unclaimable until a job with that id exists and is done.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title, or a store failure.
    pub async fn post_job(&self, new_job: NewJob) -> Result<Job> {
        new_job.validate()?;

        let mut state = self.op_lock.lock().await;
        let existing = self.store.list_jobs(&self.project_id).await?;
        let unknown = unknown_dependencies(&new_job.dependencies, &existing);
        if !unknown.is_empty() {
            tracing::warn!(
                title = %new_job.title,
                unknown = ?unknown.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
                "Job depends on unknown job ids"
            );
        }

        let created_at = state.next_created_at(Utc::now());
        let job = new_job.into_job(JobId::generate(), self.project_id.clone(), created_at);
        self.store.insert_job(&job).await?;
        self.append(NotepadEntry::JobPosted(&job)).await?;

        tracing::info!(job_id = %job.id, priority = %job.priority, title = %job.title, "Job posted");
        Ok(job)
    }

    /// Claim the highest-priority, oldest claimable job.
    ///
    /// Candidates are tried in order with a conditional claim, so a job taken
    /// by another engine between the read and the write is skipped rather
    /// than reported as an empty board.
    ///
    /// # Errors
    ///
    /// Returns a store failure. Claims are never retried.
    pub async fn claim_next_job(&self, agent_id: &AgentId) -> Result<ClaimOutcome> {
        let _guard = self.op_lock.lock().await;
        let jobs = self.store.list_jobs(&self.project_id).await?;
        let candidates = claim_candidates(&jobs);

        if candidates.is_empty() {
            return Ok(ClaimOutcome::NoJobsAvailable {
                message: NO_OPEN_JOBS_MESSAGE.to_string(),
            });
        }

        for candidate in candidates {
            let update = JobUpdate::claim(agent_id.clone(), Utc::now());
            match self
                .store
                .update_job(&self.project_id, &candidate.id, &update)
                .await?
            {
                Some(job) => {
                    self.append(NotepadEntry::JobClaimed {
                        agent: agent_id.as_str(),
                        title: &job.title,
                    })
                    .await?;
                    tracing::info!(job_id = %job.id, agent_id = %agent_id, "Job claimed");
                    return Ok(ClaimOutcome::Claimed(job));
                }
                None => {
                    tracing::debug!(job_id = %candidate.id, agent_id = %agent_id, "Claim lost to another agent");
                }
            }
        }

        Ok(ClaimOutcome::NoJobsAvailable {
            message: ALL_CLAIMED_MESSAGE.to_string(),
        })
    }

    /// Mark a job done. Only its assignee may complete it.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn complete_job(
        &self,
        agent_id: &AgentId,
        job_id: &JobId,
        outcome: &str,
    ) -> Result<CompleteOutcome> {
        let _guard = self.op_lock.lock().await;
        let current = self.store.get_job(&self.project_id, job_id).await?;
        if let Some(refusal) = completion_refusal(current.as_ref(), agent_id) {
            return Ok(refusal);
        }

        let update = JobUpdate::complete(agent_id.clone(), Utc::now());
        match self
            .store
            .update_job(&self.project_id, job_id, &update)
            .await?
        {
            Some(job) => {
                self.append(NotepadEntry::JobDone {
                    agent: agent_id.as_str(),
                    title: &job.title,
                    outcome,
                })
                .await?;
                tracing::info!(job_id = %job.id, agent_id = %agent_id, "Job completed");
                Ok(CompleteOutcome::Completed(job))
            }
            None => {
                let current = self.store.get_job(&self.project_id, job_id).await?;
                let refusal = completion_refusal(current.as_ref(), agent_id);
                Ok(refusal.unwrap_or(CompleteOutcome::InvalidState {
                    status: current.map_or(JobStatus::InProgress, |job| job.status),
                }))
            }
        }
    }

    /// Cancel a `todo` or `in_progress` job, whoever owns it.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn cancel_job(&self, job_id: &JobId, reason: &str) -> Result<CancelOutcome> {
        let _guard = self.op_lock.lock().await;
        match self.store.get_job(&self.project_id, job_id).await? {
            None => return Ok(CancelOutcome::NotFound),
            Some(job) if job.status.is_terminal() => {
                return Ok(CancelOutcome::AlreadyFinished { status: job.status });
            }
            Some(_) => {}
        }

        let update = JobUpdate::cancel(reason, Utc::now());
        match self
            .store
            .update_job(&self.project_id, job_id, &update)
            .await?
        {
            Some(job) => {
                self.append(NotepadEntry::JobCancelled(&job)).await?;
                tracing::info!(job_id = %job.id, reason, "Job cancelled");
                Ok(CancelOutcome::Cancelled(job))
            }
            None => Ok(self
                .store
                .get_job(&self.project_id, job_id)
                .await?
                .map_or(CancelOutcome::NotFound, |job| CancelOutcome::AlreadyFinished {
                    status: job.status,
                })),
        }
    }

    /// Every job on the board, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn jobs(&self) -> Result<Vec<Job>> {
        self.store.list_jobs(&self.project_id).await
    }

    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn job(&self, job_id: &JobId) -> Result<Option<Job>> {
        self.store.get_job(&self.project_id, job_id).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // NOTEPAD & SESSION
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append a free-form note from `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank text, or a store failure.
    pub async fn append_note(&self, agent_id: &AgentId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::validation_error("note text cannot be empty"));
        }
        let _guard = self.op_lock.lock().await;
        self.append(NotepadEntry::Note {
            agent: agent_id.as_str(),
            text,
        })
        .await
    }

    /// Current notepad content.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn notepad(&self) -> Result<String> {
        Ok(self
            .store
            .read_notepad(&self.project_id)
            .await?
            .unwrap_or_default())
    }

    /// Archive the notepad, reset it, clear every lock and purge finished
    /// jobs. The only operation that shrinks state.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the archive file cannot be written (nothing is
    /// reset in that case), or a store failure.
    pub async fn finalize_session(&self) -> Result<SessionFinalized> {
        let _guard = self.op_lock.lock().await;
        let now = Utc::now();
        let content = self
            .store
            .read_notepad(&self.project_id)
            .await?
            .unwrap_or_default();

        let history_dir = &self.config.history_dir;
        tokio::fs::create_dir_all(history_dir).await.map_err(|e| {
            Error::io_error(format!(
                "Failed to create history dir {}: {e}",
                history_dir.display()
            ))
        })?;
        let archive_path = write_archive(history_dir, now, &content).await?;

        self.store
            .archive_session(&SessionArchive {
                project_id: self.project_id.clone(),
                archived_at: now,
                archive_path: archive_path.display().to_string(),
                content,
            })
            .await?;
        self.store
            .write_notepad(&self.project_id, &session_start_marker(now))
            .await?;
        let locks_cleared = self.store.delete_all_locks(&self.project_id).await?;
        let jobs_purged = self.store.purge_finished_jobs(&self.project_id).await?;

        tracing::info!(
            archive_path = %archive_path.display(),
            locks_cleared,
            jobs_purged,
            "Session finalized"
        );

        Ok(SessionFinalized {
            archive_path,
            locks_cleared,
            jobs_purged,
        })
    }

    /// Archived sessions of this project, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn session_archives(&self) -> Result<Vec<SessionArchive>> {
        self.store.list_session_archives(&self.project_id).await
    }

    /// Markdown snapshot of jobs, live locks and the notepad. Does not take
    /// the operation mutex.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn live_context(&self) -> Result<String> {
        let jobs = self.store.list_jobs(&self.project_id).await?;
        let locks = self.store.list_locks(&self.project_id).await?;
        let notepad = self.notepad().await?;
        Ok(render_live_context(
            &jobs,
            &locks,
            &notepad,
            Utc::now(),
            self.config.lock_timeout(),
        ))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // INTERNALS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append an entry, then publish it. Callers hold the operation mutex.
    async fn append(&self, entry: NotepadEntry<'_>) -> Result<()> {
        let text = entry.render();
        self.store.append_notepad(&self.project_id, &text).await?;
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.publish(NotepadEvent {
                project_id: self.project_id.clone(),
                text,
                appended_at: Utc::now(),
            });
        }
        Ok(())
    }

    /// Record an audit event; a failure is logged and otherwise ignored.
    async fn audit(&self, event: LockEvent) {
        if let Err(e) = self.store.record_lock_event(&event).await {
            tracing::warn!(
                kind = %event.kind,
                file_path = %event.file_path,
                code = e.code(),
                error = %e,
                "Failed to record lock event"
            );
        }
    }

    async fn audit_blocked(
        &self,
        agent_id: &AgentId,
        file_path: &str,
        intent: &str,
        outcome: &ProposeOutcome,
    ) {
        let blocking = outcome.current_lock().map(|lock| lock.agent_id.to_string());
        tracing::info!(
            agent_id = %agent_id,
            file_path,
            holder = blocking.as_deref().unwrap_or_default(),
            status = outcome.status(),
            "Lock refused"
        );
        self.audit(LockEvent {
            project_id: self.project_id.clone(),
            kind: LockEventKind::Blocked,
            file_path: file_path.to_string(),
            requesting_agent: agent_id.to_string(),
            blocking_agent: blocking,
            detail: Some(intent.to_string()).filter(|i| !i.is_empty()),
            created_at: Utc::now(),
        })
        .await;
    }
}

/// Why `agent_id` may not complete `job`, or `None` if it may.
/// Create a new archive file in `dir`, never replacing an existing one.
async fn write_archive(dir: &Path, at: DateTime<Utc>, content: &str) -> Result<PathBuf> {
    for attempt in 0..MAX_ARCHIVE_ATTEMPTS {
        let path = dir.join(archive_file_name(at, attempt));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(content.as_bytes()).await?;
                file.flush().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(Error::io_error(format!(
                    "Failed to write archive {}: {e}",
                    path.display()
                )));
            }
        }
    }
    Err(Error::io_error(format!(
        "No free archive name in {} for {}",
        dir.display(),
        iso_timestamp(at)
    )))
}

fn completion_refusal(job: Option<&Job>, agent_id: &AgentId) -> Option<CompleteOutcome> {
    let Some(job) = job else {
        return Some(CompleteOutcome::NotFound);
    };
    if job.assigned_to.as_ref() != Some(agent_id) {
        return Some(CompleteOutcome::NotOwner {
            assigned_to: job.assigned_to.clone(),
        });
    }
    if job.status != JobStatus::InProgress {
        return Some(CompleteOutcome::InvalidState { status: job.status });
    }
    None
}
