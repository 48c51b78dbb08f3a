//! Durable record store on `SQLite`.
//!
//! Several engine instances, in one process or many, may share a database
//! file. Lock acquisition, job transitions and notepad appends are each a
//! single SQL statement, so the database serializes them.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use super::{AcquireOutcome, CoordinationStore, JobUpdate, SessionArchive};
use crate::{
    coordination::{
        job_status::{JobPriority, JobStatus},
        jobs::Job,
        lock_path::stale_cutoff,
        locks::{LockEvent, LockEventKind, LockRecord, LockRequest},
    },
    domain::{AgentId, JobId, ProjectId},
    Error, Result,
};

const BACKEND: &str = "sqlite";

/// How long a connection waits on a write lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 5;

/// Database schema, executed once on init.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS locks (
    project_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    intent TEXT NOT NULL,
    user_prompt TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (project_id, file_path)
);

CREATE TABLE IF NOT EXISTS jobs (
    project_id TEXT NOT NULL,
    id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    priority TEXT NOT NULL CHECK(priority IN ('critical', 'high', 'medium', 'low')),
    status TEXT NOT NULL CHECK(status IN ('todo', 'in_progress', 'done', 'cancelled')),
    assigned_to TEXT,
    dependencies TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    cancel_reason TEXT,
    PRIMARY KEY (project_id, id)
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(project_id, status);

CREATE TABLE IF NOT EXISTS notepads (
    project_id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS session_archives (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    archived_at INTEGER NOT NULL,
    archive_path TEXT NOT NULL,
    content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lock_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    file_path TEXT NOT NULL,
    requesting_agent TEXT NOT NULL,
    blocking_agent TEXT,
    detail TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_lock_events_created ON lock_events(project_id, created_at);
";

const LOCK_COLUMNS: &str = "project_id, file_path, agent_id, intent, user_prompt, updated_at";

const JOB_COLUMNS: &str = "project_id, id, title, description, priority, status, assigned_to, \
                           dependencies, created_at, updated_at, cancel_reason";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ROW TYPES (Infrastructure Layer)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, sqlx::FromRow)]
struct LockRow {
    project_id: String,
    file_path: String,
    agent_id: String,
    intent: String,
    user_prompt: String,
    updated_at: i64,
}

impl TryFrom<LockRow> for LockRecord {
    type Error = Error;

    fn try_from(row: LockRow) -> Result<Self> {
        Ok(Self {
            project_id: ProjectId::parse(row.project_id)?,
            file_path: row.file_path,
            agent_id: AgentId::parse(row.agent_id)?,
            intent: row.intent,
            user_prompt: row.user_prompt,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    project_id: String,
    id: String,
    title: String,
    description: String,
    priority: String,
    #[sqlx(try_from = "String")]
    status: JobStatus,
    assigned_to: Option<String>,
    dependencies: String,
    created_at: i64,
    updated_at: i64,
    cancel_reason: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let priority = JobPriority::from_str(&row.priority)
            .map_err(|e| Error::parse_error(format!("Invalid job priority '{}': {e}", row.priority)))?;
        let dependencies: Vec<JobId> = serde_json::from_str(&row.dependencies)?;
        Ok(Self {
            id: JobId::parse(row.id)?,
            project_id: ProjectId::parse(row.project_id)?,
            title: row.title,
            description: row.description,
            priority,
            status: row.status,
            assigned_to: row.assigned_to.map(AgentId::parse).transpose()?,
            dependencies,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            cancel_reason: row.cancel_reason,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LockEventRow {
    project_id: String,
    event_type: String,
    file_path: String,
    requesting_agent: String,
    blocking_agent: Option<String>,
    detail: Option<String>,
    created_at: i64,
}

impl TryFrom<LockEventRow> for LockEvent {
    type Error = Error;

    fn try_from(row: LockEventRow) -> Result<Self> {
        let kind = LockEventKind::from_str(&row.event_type).map_err(|e| {
            Error::parse_error(format!("Invalid lock event type '{}': {e}", row.event_type))
        })?;
        Ok(Self {
            project_id: ProjectId::parse(row.project_id)?,
            kind,
            file_path: row.file_path,
            requesting_agent: row.requesting_agent,
            blocking_agent: row.blocking_agent,
            detail: row.detail,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ArchiveRow {
    project_id: String,
    archived_at: i64,
    archive_path: String,
    content: String,
}

impl TryFrom<ArchiveRow> for SessionArchive {
    type Error = Error;

    fn try_from(row: ArchiveRow) -> Result<Self> {
        Ok(Self {
            project_id: ProjectId::parse(row.project_id)?,
            archived_at: from_millis(row.archived_at)?,
            archive_path: row.archive_path,
            content: row.content,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::parse_error(format!("Timestamp out of range: {millis}")))
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STORE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable store backed by a `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and initialize the
    /// schema. Enables WAL and a busy timeout so several engines can share
    /// the file.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the URL is invalid or the database cannot
    /// be opened, `DatabaseError` if the schema cannot be created.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::store_unavailable(BACKEND, format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let db = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| Error::store_unavailable(BACKEND, e.to_string()))?;

        let store = Self { db };
        store.init().await?;
        Ok(store)
    }

    /// Private in-memory database, for tests and embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to `sqlite::memory:` is a separate database.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::store_unavailable(BACKEND, e.to_string()))?;

        let store = Self { db };
        store.init().await?;
        Ok(store)
    }

    /// Create the schema if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` on failure.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.db)
            .await
            .map(|_| ())
            .map_err(|e| Error::database_error(format!("Failed to initialize schema: {e}")))
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn fetch_lock(&self, project: &ProjectId, file_path: &str) -> Result<Option<LockRecord>> {
        let sql = format!("SELECT {LOCK_COLUMNS} FROM locks WHERE project_id = ? AND file_path = ?");
        sqlx::query_as::<_, LockRow>(&sql)
            .bind(project.as_str())
            .bind(file_path)
            .fetch_optional(&self.db)
            .await?
            .map(LockRecord::try_from)
            .transpose()
    }
}

#[async_trait::async_trait]
impl CoordinationStore for SqliteStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn resolve_project(&self, name: &str) -> Result<ProjectId> {
        sqlx::query("INSERT INTO projects (id, name, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(ProjectId::generate().as_str())
            .bind(name)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.db)
            .await?;

        let id: String = sqlx::query_scalar("SELECT id FROM projects WHERE name = ?")
            .bind(name)
            .fetch_one(&self.db)
            .await?;
        Ok(ProjectId::parse(id)?)
    }

    async fn list_locks(&self, project: &ProjectId) -> Result<Vec<LockRecord>> {
        let sql = format!(
            "SELECT {LOCK_COLUMNS} FROM locks WHERE project_id = ? ORDER BY file_path"
        );
        let rows = sqlx::query_as::<_, LockRow>(&sql)
            .bind(project.as_str())
            .fetch_all(&self.db)
            .await?;
        convert_all(rows)
    }

    async fn try_acquire_lock(
        &self,
        project: &ProjectId,
        request: &LockRequest,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<AcquireOutcome> {
        let sql = format!(
            "INSERT INTO locks ({LOCK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(project_id, file_path) DO UPDATE SET
                 agent_id = excluded.agent_id,
                 intent = excluded.intent,
                 user_prompt = excluded.user_prompt,
                 updated_at = excluded.updated_at
             WHERE locks.agent_id = excluded.agent_id OR locks.updated_at < ?
             RETURNING {LOCK_COLUMNS}"
        );
        let granted = sqlx::query_as::<_, LockRow>(&sql)
            .bind(project.as_str())
            .bind(&request.file_path)
            .bind(request.agent_id.as_str())
            .bind(&request.intent)
            .bind(&request.user_prompt)
            .bind(now.timestamp_millis())
            .bind(stale_cutoff(now, timeout).timestamp_millis())
            .fetch_optional(&self.db)
            .await?;

        if let Some(row) = granted {
            return Ok(AcquireOutcome::Granted(LockRecord::try_from(row)?));
        }

        self.fetch_lock(project, &request.file_path)
            .await?
            .map(AcquireOutcome::Held)
            .ok_or_else(|| {
                Error::database_error(format!(
                    "Lock on '{}' was refused but no holder was found",
                    request.file_path
                ))
            })
    }

    async fn delete_lock(
        &self,
        project: &ProjectId,
        file_path: &str,
    ) -> Result<Option<LockRecord>> {
        let sql = format!(
            "DELETE FROM locks WHERE project_id = ? AND file_path = ? RETURNING {LOCK_COLUMNS}"
        );
        sqlx::query_as::<_, LockRow>(&sql)
            .bind(project.as_str())
            .bind(file_path)
            .fetch_optional(&self.db)
            .await?
            .map(LockRecord::try_from)
            .transpose()
    }

    async fn delete_all_locks(&self, project: &ProjectId) -> Result<usize> {
        let result = sqlx::query("DELETE FROM locks WHERE project_id = ?")
            .bind(project.as_str())
            .execute(&self.db)
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn delete_stale_locks(
        &self,
        project: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>> {
        let sql = format!(
            "DELETE FROM locks WHERE project_id = ? AND updated_at < ? RETURNING {LOCK_COLUMNS}"
        );
        let rows = sqlx::query_as::<_, LockRow>(&sql)
            .bind(project.as_str())
            .bind(cutoff.timestamp_millis())
            .fetch_all(&self.db)
            .await?;
        convert_all(rows)
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        let sql = format!(
            "INSERT INTO jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(job.project_id.as_str())
            .bind(job.id.as_str())
            .bind(&job.title)
            .bind(&job.description)
            .bind(job.priority.to_string())
            .bind(job.status.as_str())
            .bind(job.assigned_to.as_ref().map(AgentId::as_str))
            .bind(serde_json::to_string(&job.dependencies)?)
            .bind(job.created_at.timestamp_millis())
            .bind(job.updated_at.timestamp_millis())
            .bind(job.cancel_reason.as_deref())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn list_jobs(&self, project: &ProjectId) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE project_id = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(project.as_str())
            .fetch_all(&self.db)
            .await?;
        convert_all(rows)
    }

    async fn get_job(&self, project: &ProjectId, id: &JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE project_id = ? AND id = ?");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(project.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.db)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn update_job(
        &self,
        project: &ProjectId,
        id: &JobId,
        update: &JobUpdate,
    ) -> Result<Option<Job>> {
        if update.expect_status.is_empty() {
            return Ok(None);
        }

        let status_slots = update.expect_status.iter().map(|_| "?").join(", ");
        let assignee_guard = if update.expect_assignee.is_some() {
            " AND assigned_to = ?"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE jobs SET
                 status = ?,
                 assigned_to = COALESCE(?, assigned_to),
                 cancel_reason = COALESCE(?, cancel_reason),
                 updated_at = ?
             WHERE project_id = ? AND id = ? AND status IN ({status_slots}){assignee_guard}
             RETURNING {JOB_COLUMNS}"
        );

        let query = sqlx::query_as::<_, JobRow>(&sql)
            .bind(update.status.as_str())
            .bind(update.assigned_to.as_ref().map(AgentId::as_str))
            .bind(update.cancel_reason.as_deref())
            .bind(update.updated_at.timestamp_millis())
            .bind(project.as_str())
            .bind(id.as_str());
        let query = update
            .expect_status
            .iter()
            .fold(query, |query, status| query.bind(status.as_str()));
        let query = match &update.expect_assignee {
            Some(agent) => query.bind(agent.as_str()),
            None => query,
        };

        query
            .fetch_optional(&self.db)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn purge_finished_jobs(&self, project: &ProjectId) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE project_id = ? AND status IN ('done', 'cancelled')",
        )
        .bind(project.as_str())
        .execute(&self.db)
        .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn read_notepad(&self, project: &ProjectId) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT content FROM notepads WHERE project_id = ?")
                .bind(project.as_str())
                .fetch_optional(&self.db)
                .await?,
        )
    }

    async fn write_notepad(&self, project: &ProjectId, content: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO notepads (project_id, content, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET
                 content = excluded.content,
                 updated_at = excluded.updated_at",
        )
        .bind(project.as_str())
        .bind(content)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn append_notepad(&self, project: &ProjectId, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO notepads (project_id, content, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET
                 content = notepads.content || excluded.content,
                 updated_at = excluded.updated_at",
        )
        .bind(project.as_str())
        .bind(text)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn archive_session(&self, archive: &SessionArchive) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_archives (project_id, archived_at, archive_path, content)
             VALUES (?, ?, ?, ?)",
        )
        .bind(archive.project_id.as_str())
        .bind(archive.archived_at.timestamp_millis())
        .bind(&archive.archive_path)
        .bind(&archive.content)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_session_archives(&self, project: &ProjectId) -> Result<Vec<SessionArchive>> {
        let rows = sqlx::query_as::<_, ArchiveRow>(
            "SELECT project_id, archived_at, archive_path, content FROM session_archives
             WHERE project_id = ? ORDER BY archived_at, id",
        )
        .bind(project.as_str())
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }

    async fn record_lock_event(&self, event: &LockEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO lock_events
                 (project_id, event_type, file_path, requesting_agent, blocking_agent, detail, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.project_id.as_str())
        .bind(event.kind.to_string())
        .bind(&event.file_path)
        .bind(&event.requesting_agent)
        .bind(event.blocking_agent.as_deref())
        .bind(event.detail.as_deref())
        .bind(event.created_at.timestamp_millis())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_lock_events(
        &self,
        project: &ProjectId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LockEvent>> {
        let rows = sqlx::query_as::<_, LockEventRow>(
            "SELECT project_id, event_type, file_path, requesting_agent, blocking_agent, detail, created_at
             FROM lock_events WHERE project_id = ? AND created_at >= ?
             ORDER BY created_at, id",
        )
        .bind(project.as_str())
        .bind(since.timestamp_millis())
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::coordination::jobs::NewJob;

    const TIMEOUT: Duration = Duration::from_secs(1800);

    async fn setup() -> Result<(SqliteStore, ProjectId)> {
        let store = SqliteStore::in_memory().await?;
        let project = store.resolve_project("default").await?;
        Ok((store, project))
    }

    fn request(path: &str, agent: &str) -> LockRequest {
        LockRequest {
            file_path: path.to_string(),
            agent_id: AgentId::parse(agent).unwrap(),
            intent: "edit".to_string(),
            user_prompt: format!("{agent} prompt"),
        }
    }

    #[tokio::test]
    async fn test_resolve_project_is_idempotent() -> Result<()> {
        let (store, project) = setup().await?;
        assert_eq!(store.resolve_project("default").await?, project);
        assert_ne!(store.resolve_project("other").await?, project);
        Ok(())
    }

    #[tokio::test]
    async fn test_acquire_free_path() -> Result<()> {
        let (store, project) = setup().await?;
        let outcome = store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), Utc::now(), TIMEOUT)
            .await?;
        assert!(matches!(outcome, AcquireOutcome::Granted(ref l) if l.agent_id.as_str() == "agent-a"));
        Ok(())
    }

    #[tokio::test]
    async fn test_acquire_held_returns_holder() -> Result<()> {
        let (store, project) = setup().await?;
        let now = Utc::now();
        store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), now, TIMEOUT)
            .await?;
        let outcome = store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-b"), now, TIMEOUT)
            .await?;
        match outcome {
            AcquireOutcome::Held(lock) => {
                assert_eq!(lock.agent_id.as_str(), "agent-a");
                assert_eq!(lock.user_prompt, "agent-a prompt");
            }
            AcquireOutcome::Granted(_) => panic!("lock should be held by agent-a"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_same_agent_refreshes() -> Result<()> {
        let (store, project) = setup().await?;
        let earlier = Utc::now() - TimeDelta::seconds(60);
        store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), earlier, TIMEOUT)
            .await?;
        let now = Utc::now();
        let outcome = store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), now, TIMEOUT)
            .await?;
        match outcome {
            AcquireOutcome::Granted(lock) => {
                assert_eq!(lock.updated_at.timestamp_millis(), now.timestamp_millis());
            }
            AcquireOutcome::Held(_) => panic!("same agent should refresh"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() -> Result<()> {
        let (store, project) = setup().await?;
        let old = Utc::now() - TimeDelta::seconds(1801);
        store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), old, TIMEOUT)
            .await?;
        let outcome = store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-b"), Utc::now(), TIMEOUT)
            .await?;
        assert!(matches!(outcome, AcquireOutcome::Granted(ref l) if l.agent_id.as_str() == "agent-b"));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_stale_locks_returns_removed() -> Result<()> {
        let (store, project) = setup().await?;
        let now = Utc::now();
        store
            .try_acquire_lock(
                &project,
                &request("src/old.rs", "agent-a"),
                now - TimeDelta::seconds(4000),
                TIMEOUT,
            )
            .await?;
        store
            .try_acquire_lock(&project, &request("src/new.rs", "agent-b"), now, TIMEOUT)
            .await?;

        let removed = store
            .delete_stale_locks(&project, stale_cutoff(now, TIMEOUT))
            .await?;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].file_path, "src/old.rs");
        assert_eq!(store.list_locks(&project).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_job_is_conditional() -> Result<()> {
        let (store, project) = setup().await?;
        let job = NewJob::new("task")
            .priority(JobPriority::High)
            .depends_on([JobId::parse("job-0").unwrap()])
            .into_job(JobId::parse("job-1").unwrap(), project.clone(), Utc::now());
        store.insert_job(&job).await?;

        let a = AgentId::parse("agent-a").unwrap();
        let b = AgentId::parse("agent-b").unwrap();
        let first = store
            .update_job(&project, &job.id, &JobUpdate::claim(a.clone(), Utc::now()))
            .await?;
        let second = store
            .update_job(&project, &job.id, &JobUpdate::claim(b.clone(), Utc::now()))
            .await?;
        assert_eq!(first.and_then(|j| j.assigned_to), Some(a.clone()));
        assert_eq!(second, None);

        let not_owner = store
            .update_job(&project, &job.id, &JobUpdate::complete(b, Utc::now()))
            .await?;
        assert_eq!(not_owner, None);

        let done = store
            .update_job(&project, &job.id, &JobUpdate::complete(a, Utc::now()))
            .await?;
        let done = done.unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.priority, JobPriority::High);
        assert_eq!(done.dependencies, job.dependencies);

        assert_eq!(store.purge_finished_jobs(&project).await?, 1);
        assert!(store.list_jobs(&project).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_append_notepad_is_server_side() -> Result<()> {
        let (store, project) = setup().await?;
        store.append_notepad(&project, "first").await?;
        store.append_notepad(&project, " second").await?;
        assert_eq!(
            store.read_notepad(&project).await?.as_deref(),
            Some("first second")
        );
        store.write_notepad(&project, "reset").await?;
        assert_eq!(store.read_notepad(&project).await?.as_deref(), Some("reset"));
        Ok(())
    }

    #[tokio::test]
    async fn test_lock_events_round_trip() -> Result<()> {
        let (store, project) = setup().await?;
        let now = Utc::now();
        let event = LockEvent {
            project_id: project.clone(),
            kind: LockEventKind::ForceUnlocked,
            file_path: "src/a.rs".to_string(),
            requesting_agent: "admin".to_string(),
            blocking_agent: Some("agent-a".to_string()),
            detail: Some("stuck".to_string()),
            created_at: now,
        };
        store.record_lock_event(&event).await?;
        let events = store
            .list_lock_events(&project, now - TimeDelta::seconds(1))
            .await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, LockEventKind::ForceUnlocked);
        assert!(store
            .list_lock_events(&project, now + TimeDelta::seconds(1))
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_projects_are_isolated() -> Result<()> {
        let (store, project) = setup().await?;
        let other = store.resolve_project("other").await?;
        store
            .try_acquire_lock(&project, &request("src/a.rs", "agent-a"), Utc::now(), TIMEOUT)
            .await?;
        assert!(store.list_locks(&other).await?.is_empty());
        let outcome = store
            .try_acquire_lock(&other, &request("src/a.rs", "agent-b"), Utc::now(), TIMEOUT)
            .await?;
        assert!(matches!(outcome, AcquireOutcome::Granted(_)));
        Ok(())
    }
}
