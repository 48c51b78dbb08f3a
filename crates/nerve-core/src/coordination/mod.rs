//! Coordination primitives for concurrent agents sharing one workspace.

pub mod context;
pub mod engine;
pub mod job_status;
pub mod jobs;
pub mod lock_path;
pub mod locks;
pub mod notepad;

pub use context::render_live_context;
pub use engine::{NerveCenter, SessionFinalized};
pub use job_status::{JobPriority, JobStatus, TransitionError};
pub use jobs::{CancelOutcome, ClaimOutcome, CompleteOutcome, Job, NewJob};
pub use lock_path::ScopeRejection;
pub use locks::{
    DailyLockStats, LockEvent, LockEventKind, LockEventStats, LockEventSummary, LockRecord,
    LockRequest, ProposeOutcome, ReleaseOutcome,
};
pub use notepad::{Broadcaster, ChannelBroadcaster, NotepadEntry, NotepadEvent};
