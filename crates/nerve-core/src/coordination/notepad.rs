//! Notepad line formatting and live broadcast.
//!
//! The notepad is a per-project append-only text buffer. Every structural
//! event appends one human-readable entry; agents may append free-form notes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::jobs::Job;
use crate::domain::ProjectId;

/// Default capacity of a [`ChannelBroadcaster`].
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// ISO-8601 UTC timestamp with milliseconds (`2025-01-01T12:00:00.000Z`).
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fresh notepad content for a new session.
pub fn session_start_marker(at: DateTime<Utc>) -> String {
    format!("Session Start: {}\n", iso_timestamp(at))
}

/// File name of the archive written at finalize, safe on every filesystem.
/// `attempt` above zero adds a suffix for a name already taken.
pub fn archive_file_name(at: DateTime<Utc>, attempt: u32) -> String {
    let stamp = iso_timestamp(at).replace([':', '.'], "-");
    match attempt {
        0 => format!("session-{stamp}.md"),
        n => format!("session-{stamp}-{n}.md"),
    }
}

/// A structural event rendered into the notepad.
#[derive(Debug, Clone, Copy)]
pub enum NotepadEntry<'a> {
    LockGranted {
        agent: &'a str,
        path: &'a str,
        intent: &'a str,
        prompt: &'a str,
    },
    JobPosted(&'a Job),
    JobClaimed {
        agent: &'a str,
        title: &'a str,
    },
    JobDone {
        agent: &'a str,
        title: &'a str,
        outcome: &'a str,
    },
    JobCancelled(&'a Job),
    ForceUnlocked {
        path: &'a str,
        reason: &'a str,
    },
    LockExpired {
        path: &'a str,
        agent: &'a str,
    },
    Note {
        agent: &'a str,
        text: &'a str,
    },
}

impl NotepadEntry<'_> {
    /// Text appended to the notepad, including its leading newline(s).
    pub fn render(&self) -> String {
        match self {
            Self::LockGranted {
                agent,
                path,
                intent,
                prompt,
            } => format!(
                "\n\n### [{agent}] Locked '{path}'\n**Intent:** {intent}\n**Prompt:** \"{prompt}\""
            ),
            Self::JobPosted(job) => {
                let deps = if job.dependencies.is_empty() {
                    String::new()
                } else {
                    let ids: Vec<&str> = job.dependencies.iter().map(|d| d.as_str()).collect();
                    format!(" (Depends on: {})", ids.join(", "))
                };
                format!(
                    "\n- [JOB POSTED] [{}] {} (ID: {}){deps}",
                    job.priority.label(),
                    job.title,
                    job.id
                )
            }
            Self::JobClaimed { agent, title } => {
                format!("\n- [JOB CLAIMED] Agent '{agent}' picked up: {title}")
            }
            Self::JobDone {
                agent,
                title,
                outcome,
            } => format!("\n- [JOB DONE] {title} by {agent}. Outcome: {outcome}"),
            Self::JobCancelled(job) => format!(
                "\n- [JOB CANCELLED] {} (ID: {}). Reason: {}",
                job.title,
                job.id,
                job.cancel_reason.as_deref().unwrap_or_default()
            ),
            Self::ForceUnlocked { path, reason } => {
                format!("\n- [ADMIN] Force unlocked '{path}'. Reason: {reason}")
            }
            Self::LockExpired { path, agent } => {
                format!("\n- [SYSTEM] Lock expired for '{path}' (held by {agent})")
            }
            Self::Note { agent, text } => format!("\n- [{agent}] {text}"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LIVE BROADCAST
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One successful notepad append, as seen by live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotepadEvent {
    pub project_id: ProjectId,
    pub text: String,
    pub appended_at: DateTime<Utc>,
}

/// Real-time fan-out of notepad appends.
pub trait Broadcaster: Send + Sync {
    /// Publish an append. Must not block and must not fail the caller.
    fn publish(&self, event: NotepadEvent);
}

/// [`Broadcaster`] backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<NotepadEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotepadEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, event: NotepadEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Notepad append not broadcast: no subscribers");
        }
    }
}
