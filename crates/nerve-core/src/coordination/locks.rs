//! Lock records, proposal outcomes and the lock audit trail.
//!
//! A lock is an exclusive grant on a path within a project. Conflicts are not
//! errors: every refusal carries the current holder so the caller can decide
//! whether to wait, work elsewhere, or escalate.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::{AgentId, ProjectId};

/// Number of recent `BLOCKED` events returned with lock statistics.
pub const RECENT_BLOCKED_LIMIT: usize = 20;

/// Widest statistics window in days; larger requests are clamped to it.
pub const MAX_STATS_DAYS: u32 = 366;

/// An exclusive-access grant on a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub project_id: ProjectId,
    /// Normalized lock key (trailing slashes removed).
    pub file_path: String,
    pub agent_id: AgentId,
    pub intent: String,
    pub user_prompt: String,
    pub updated_at: DateTime<Utc>,
}

/// What an agent asks for when proposing access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub file_path: String,
    pub agent_id: AgentId,
    pub intent: String,
    pub user_prompt: String,
}

impl LockRequest {
    pub(crate) fn into_record(self, project_id: ProjectId, now: DateTime<Utc>) -> LockRecord {
        LockRecord {
            project_id,
            file_path: self.file_path,
            agent_id: self.agent_id,
            intent: self.intent,
            user_prompt: self.user_prompt,
            updated_at: now,
        }
    }
}

/// Result of `propose_access`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposeOutcome {
    /// The lock is held by the caller, freshly created or refreshed.
    Granted(LockRecord),
    /// The exact path is held by another live agent.
    RequiresOrchestration { current: LockRecord, message: String },
    /// The path is too broad, or overlaps a live lock on an ancestor or
    /// descendant path.
    Denied {
        current: Option<LockRecord>,
        reason: String,
    },
}

impl ProposeOutcome {
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Granted(_) => "GRANTED",
            Self::RequiresOrchestration { .. } => "REQUIRES_ORCHESTRATION",
            Self::Denied { .. } => "DENIED",
        }
    }

    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// The lock standing in the caller's way, if any.
    pub const fn current_lock(&self) -> Option<&LockRecord> {
        match self {
            Self::Granted(_) => None,
            Self::RequiresOrchestration { current, .. } => Some(current),
            Self::Denied { current, .. } => current.as_ref(),
        }
    }

    pub(crate) fn held_by_other(current: LockRecord) -> Self {
        let message = format!(
            "Conflict: File '{}' is currently locked by agent '{}' who is working on: \"{}\".",
            current.file_path, current.agent_id, current.user_prompt
        );
        Self::RequiresOrchestration { current, message }
    }

    pub(crate) fn overlapping(requested: &str, current: LockRecord) -> Self {
        let reason = format!(
            "Path '{requested}' overlaps with '{}' locked by '{}'",
            current.file_path, current.agent_id
        );
        Self::Denied {
            current: Some(current),
            reason,
        }
    }
}

/// Result of `release` and `force_unlock`. Always succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// The record that was removed, if the path was locked.
    pub previous: Option<LockRecord>,
}

impl ReleaseOutcome {
    pub const fn status(&self) -> &'static str {
        "UNLOCKED"
    }

    pub fn previous_owner(&self) -> Option<&AgentId> {
        self.previous.as_ref().map(|lock| &lock.agent_id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AUDIT TRAIL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockEventKind {
    Granted,
    Blocked,
    Released,
    ForceUnlocked,
    Expired,
}

/// One lock decision, kept for statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    pub project_id: ProjectId,
    pub kind: LockEventKind,
    pub file_path: String,
    /// Agent that asked, or `admin` / `system` for unlocks and expiry.
    pub requesting_agent: String,
    pub blocking_agent: Option<String>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockEventSummary {
    pub granted: u64,
    pub blocked: u64,
    pub released: u64,
    pub force_unlocked: u64,
    pub expired: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyLockStats {
    pub date: NaiveDate,
    /// Three-letter lowercase weekday (`mon`, `tue`, ...).
    pub day: String,
    pub blocked: u64,
    pub granted: u64,
}

/// Aggregated lock activity over a window of UTC days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEventStats {
    pub summary: LockEventSummary,
    /// One entry per day, oldest first, ending today.
    pub daily: Vec<DailyLockStats>,
    /// Most recent `BLOCKED` events, newest first.
    pub recent_blocked: Vec<LockEvent>,
}

/// Start of the statistics window: midnight UTC `days - 1` days before `now`,
/// with `days` clamped to `1..=MAX_STATS_DAYS`.
pub fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let today = now.date_naive();
    let span = TimeDelta::days(i64::from(days.clamp(1, MAX_STATS_DAYS)) - 1);
    today
        .checked_sub_signed(span)
        .unwrap_or(NaiveDate::MIN)
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
}

impl LockEventStats {
    /// Aggregate `events` into a `days`-long window ending on `now`'s UTC day.
    /// Events outside the window are ignored.
    pub fn compute(events: &[LockEvent], now: DateTime<Utc>, days: u32) -> Self {
        let start = window_start(now, days);
        let in_window = events
            .iter()
            .filter(|event| event.created_at >= start && event.created_at <= now)
            .collect::<Vec<_>>();

        let summary = in_window
            .iter()
            .fold(LockEventSummary::default(), |mut acc, event| {
                match event.kind {
                    LockEventKind::Granted => acc.granted += 1,
                    LockEventKind::Blocked => acc.blocked += 1,
                    LockEventKind::Released => acc.released += 1,
                    LockEventKind::ForceUnlocked => acc.force_unlocked += 1,
                    LockEventKind::Expired => acc.expired += 1,
                }
                acc
            });

        let per_day: BTreeMap<NaiveDate, (u64, u64)> =
            in_window.iter().fold(BTreeMap::new(), |mut acc, event| {
                let entry = acc.entry(event.created_at.date_naive()).or_insert((0, 0));
                match event.kind {
                    LockEventKind::Blocked => entry.0 += 1,
                    LockEventKind::Granted => entry.1 += 1,
                    _ => {}
                }
                acc
            });

        let first = start.date_naive();
        let daily = first
            .iter_days()
            .take_while(|date| *date <= now.date_naive())
            .map(|date| {
                let (blocked, granted) = per_day.get(&date).copied().unwrap_or((0, 0));
                DailyLockStats {
                    date,
                    day: date.weekday().to_string().to_lowercase(),
                    blocked,
                    granted,
                }
            })
            .collect();

        let recent_blocked = in_window
            .into_iter()
            .filter(|event| event.kind == LockEventKind::Blocked)
            .sorted_by(|a, b| b.created_at.cmp(&a.created_at))
            .take(RECENT_BLOCKED_LIMIT)
            .cloned()
            .collect();

        Self {
            summary,
            daily,
            recent_blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectId {
        ProjectId::parse("proj-test").unwrap()
    }

    fn record(path: &str, agent: &str) -> LockRecord {
        LockRecord {
            project_id: project(),
            file_path: path.to_string(),
            agent_id: AgentId::parse(agent).unwrap(),
            intent: "refactor".to_string(),
            user_prompt: "split the module".to_string(),
            updated_at: Utc::now(),
        }
    }

    fn event(kind: LockEventKind, at: DateTime<Utc>) -> LockEvent {
        LockEvent {
            project_id: project(),
            kind,
            file_path: "src/lib.rs".to_string(),
            requesting_agent: "agent-a".to_string(),
            blocking_agent: None,
            detail: None,
            created_at: at,
        }
    }

    #[test]
    fn test_held_by_other_message_names_holder_and_prompt() {
        let outcome = ProposeOutcome::held_by_other(record("src/lib.rs", "agent-b"));
        assert_eq!(outcome.status(), "REQUIRES_ORCHESTRATION");
        match outcome {
            ProposeOutcome::RequiresOrchestration { message, .. } => assert_eq!(
                message,
                "Conflict: File 'src/lib.rs' is currently locked by agent 'agent-b' \
                 who is working on: \"split the module\"."
            ),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_is_denied_with_current_lock() {
        let outcome = ProposeOutcome::overlapping("src/api/v1", record("src/api", "agent-b"));
        assert_eq!(outcome.status(), "DENIED");
        assert_eq!(
            outcome.current_lock().map(|l| l.agent_id.as_str()),
            Some("agent-b")
        );
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(LockEventKind::ForceUnlocked.to_string(), "FORCE_UNLOCKED");
        assert_eq!(
            "BLOCKED".parse::<LockEventKind>().ok(),
            Some(LockEventKind::Blocked)
        );
    }

    #[test]
    fn test_stats_fill_missing_days_with_zeros() {
        let now = Utc::now();
        let stats = LockEventStats::compute(&[], now, 7);
        assert_eq!(stats.daily.len(), 7);
        assert!(stats.daily.iter().all(|d| d.blocked == 0 && d.granted == 0));
        assert_eq!(stats.daily.last().map(|d| d.date), Some(now.date_naive()));
    }

    #[test]
    fn test_stats_count_by_kind_and_day() {
        let now = Utc::now();
        let yesterday = now - TimeDelta::days(1);
        let events = vec![
            event(LockEventKind::Granted, now),
            event(LockEventKind::Blocked, now),
            event(LockEventKind::Blocked, yesterday),
            event(LockEventKind::Released, now),
            event(LockEventKind::Granted, now - TimeDelta::days(30)),
        ];

        let stats = LockEventStats::compute(&events, now, 7);
        assert_eq!(stats.summary.granted, 1);
        assert_eq!(stats.summary.blocked, 2);
        assert_eq!(stats.summary.released, 1);

        let today = stats.daily.last().unwrap();
        assert_eq!((today.blocked, today.granted), (1, 1));
        let before = &stats.daily[stats.daily.len() - 2];
        assert_eq!((before.blocked, before.granted), (1, 0));
        assert_eq!(stats.recent_blocked.len(), 2);
        assert_eq!(stats.recent_blocked[0].created_at, now);
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let now = Utc::now();
        let stats = LockEventStats::compute(&[], now, u32::MAX);
        assert_eq!(stats.daily.len(), MAX_STATS_DAYS as usize);
        assert_eq!(stats.daily.last().map(|d| d.date), Some(now.date_naive()));

        let zero = LockEventStats::compute(&[], now, 0);
        assert_eq!(zero.daily.len(), 1);
    }

    #[test]
    fn test_recent_blocked_is_capped() {
        let now = Utc::now();
        let events: Vec<_> = (0..30)
            .map(|i| event(LockEventKind::Blocked, now - TimeDelta::seconds(i)))
            .collect();
        let stats = LockEventStats::compute(&events, now, 2);
        assert_eq!(stats.recent_blocked.len(), RECENT_BLOCKED_LIMIT);
        assert_eq!(stats.summary.blocked, 30);
    }
}
