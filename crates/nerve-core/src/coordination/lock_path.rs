//! Pure path rules for the lock manager: input limits, scope checks,
//! normalisation, hierarchical overlap and lazy expiry.

use std::{fmt, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{Error, Result};

/// Minimum number of segments for a directory-style lock.
pub const MIN_DIR_LOCK_DEPTH: usize = 2;

/// Maximum accepted length of a raw lock path.
pub const MAX_PATH_LEN: usize = 1000;

/// Why a syntactically valid path is refused as a lock target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRejection {
    Empty,
    Root,
    TooBroad { path: String, depth: usize },
}

impl fmt::Display for ScopeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Cannot lock an empty path."),
            Self::Root => f.write_str(
                "Cannot lock the entire project root. Lock specific files or subdirectories instead.",
            ),
            Self::TooBroad { path, depth } => write!(
                f,
                "Directory lock '{path}' is too broad (depth {depth}, minimum {MIN_DIR_LOCK_DEPTH}). \
                 Lock a more specific subdirectory or individual files instead."
            ),
        }
    }
}

/// Reject paths that are malformed rather than merely too broad.
///
/// # Errors
///
/// Returns a validation error for NUL bytes or a path longer than
/// [`MAX_PATH_LEN`] characters.
pub fn check_input(raw: &str) -> Result<()> {
    if raw.contains('\0') {
        return Err(Error::validation_error("file path must not contain NUL bytes"));
    }
    let len = raw.chars().count();
    if len > MAX_PATH_LEN {
        return Err(Error::validation_error(format!(
            "file path too long: {len} characters (max {MAX_PATH_LEN})"
        )));
    }
    Ok(())
}

/// Lock key for a path: surrounding whitespace and trailing slashes removed.
pub fn normalize(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Check that `raw` is narrow enough to lock and return its lock key.
///
/// The last segment counts as a file when it contains a `.`; anything else is
/// a directory and needs at least [`MIN_DIR_LOCK_DEPTH`] segments.
pub fn check_scope(raw: &str) -> std::result::Result<String, ScopeRejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScopeRejection::Empty);
    }

    let relative = trimmed.trim_matches('/');
    if relative.is_empty() || relative == "." {
        return Err(ScopeRejection::Root);
    }

    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let is_file = segments.last().is_some_and(|last| last.contains('.'));
    if !is_file && segments.len() < MIN_DIR_LOCK_DEPTH {
        return Err(ScopeRejection::TooBroad {
            path: relative.to_string(),
            depth: segments.len(),
        });
    }

    Ok(normalize(trimmed))
}

/// True when two normalized lock keys are equal or one contains the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    a == b || is_descendant(a, b) || is_descendant(b, a)
}

/// True when `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// A lock is stale once strictly more than `timeout` has passed since its
/// last refresh.
pub fn is_stale(updated_at: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    now.signed_duration_since(updated_at) > to_delta(timeout)
}

/// Oldest `updated_at` that is still live at `now`.
pub fn stale_cutoff(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(to_delta(timeout))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn to_delta(timeout: Duration) -> TimeDelta {
    TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX)
}
