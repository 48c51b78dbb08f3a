//! # Nerve Core
//!
//! Coordination engine for concurrent AI agents working in one codebase:
//! hierarchical file locks with lazy expiry, a prioritized job board with
//! dependencies, and a shared append-only notepad, persisted to `SQLite` with
//! a local snapshot fallback.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, Error>`. Conflicts are not
//! errors: a refused lock or an empty job board comes back as an outcome
//! value. Errors are reserved for invalid input and store failures.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod coordination;
pub mod domain;
mod error;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use coordination::{
    CancelOutcome, ClaimOutcome, CompleteOutcome, Job, JobPriority, JobStatus, LockRecord,
    NerveCenter, NewJob, ProposeOutcome, ReleaseOutcome, SessionFinalized,
};
pub use domain::{AgentId, JobId, ProjectId};
pub use error::{Error, ExecutionError, Result, SystemError, ValidationError};
pub use store::{CoordinationStore, LocalStore, MirroredStore, SqliteStore};
