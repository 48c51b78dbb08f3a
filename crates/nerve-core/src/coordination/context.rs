//! Live context rendering: a markdown snapshot of the job board, the live
//! locks and the notepad.

use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;

use super::{jobs::Job, lock_path::is_stale, locks::LockRecord};

/// Characters of a lock's prompt shown in the context.
pub const PROMPT_PREVIEW_CHARS: usize = 100;

/// Render the context. Stale locks are left out.
pub fn render_live_context(
    jobs: &[Job],
    locks: &[LockRecord],
    notepad: &str,
    now: DateTime<Utc>,
    lock_timeout: Duration,
) -> String {
    let job_summary = jobs
        .iter()
        .sorted_by(|a, b| (a.created_at, a.id.as_str()).cmp(&(b.created_at, b.id.as_str())))
        .map(|job| {
            let owner = job
                .assigned_to
                .as_ref()
                .map_or_else(|| "(Open)".to_string(), |agent| format!("({agent})"));
            format!(
                "- [{}] {} {owner}\n  ID: {}",
                job.status.as_str().to_uppercase(),
                job.title,
                job.id
            )
        })
        .join("\n");

    let lock_summary = locks
        .iter()
        .filter(|lock| !is_stale(lock.updated_at, now, lock_timeout))
        .sorted_by(|a, b| a.file_path.cmp(&b.file_path))
        .map(|lock| {
            let preview: String = lock.user_prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
            format!(
                "- [LOCKED] {} by {}\n  Intent: {}\n  Prompt: \"{preview}...\"",
                lock.file_path, lock.agent_id, lock.intent
            )
        })
        .join("\n");

    let job_summary = if job_summary.is_empty() {
        "No active jobs.".to_string()
    } else {
        job_summary
    };
    let lock_summary = if lock_summary.is_empty() {
        "No active locks.".to_string()
    } else {
        lock_summary
    };

    format!(
        "# Active Session Context\n\n## Job Board (Active Orchestration)\n{job_summary}\n\n\
         ## Task Registry (Locks)\n{lock_summary}\n\n## Live Notepad\n{notepad}"
    )
}
