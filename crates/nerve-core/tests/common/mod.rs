//! Shared helpers for nerve-core integration tests.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use nerve_core::{
    AgentId, Config, CoordinationStore, LocalStore, LockRecord, NerveCenter, ProjectId, Result,
    SqliteStore,
};
use tempfile::TempDir;

pub fn agent(name: &str) -> AgentId {
    AgentId::parse(name).unwrap()
}

/// Engine on a fresh in-memory local store, with history under a temp dir.
pub async fn local_engine() -> Result<(NerveCenter, TempDir)> {
    let dir = tempfile::tempdir()?;
    let engine =
        NerveCenter::with_store(Arc::new(LocalStore::in_memory()), Config::local(dir.path()))
            .await?;
    Ok((engine, dir))
}

/// Engine sharing `store` with the test, so records can be seeded directly.
pub async fn engine_on(
    store: Arc<LocalStore>,
    dir: &Path,
    timeout: Duration,
) -> Result<NerveCenter> {
    let shared: Arc<dyn CoordinationStore> = store;
    NerveCenter::with_store(shared, Config::local(dir).with_lock_timeout(timeout)).await
}

/// Engine on a private in-memory `SQLite` database.
pub async fn sqlite_engine() -> Result<(NerveCenter, TempDir)> {
    let dir = tempfile::tempdir()?;
    let engine = NerveCenter::with_store(
        Arc::new(SqliteStore::in_memory().await?),
        Config::local(dir.path()),
    )
    .await?;
    Ok((engine, dir))
}

/// Config pointing at an on-disk `SQLite` database inside `dir`.
pub fn file_db_config(dir: &Path) -> Config {
    let url = format!("sqlite://{}", dir.join("nerve.db").display());
    Config::local(dir).with_database_url(url)
}

pub fn lock_at(
    project_id: &ProjectId,
    path: &str,
    holder: &str,
    updated_at: DateTime<Utc>,
) -> LockRecord {
    LockRecord {
        project_id: project_id.clone(),
        file_path: path.to_string(),
        agent_id: agent(holder),
        intent: "edit".to_string(),
        user_prompt: "old work".to_string(),
        updated_at,
    }
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - TimeDelta::minutes(minutes)
}
