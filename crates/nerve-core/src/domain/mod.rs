//! Domain primitives shared by the lock manager, job board and stores.

pub mod identifiers;

pub use identifiers::{AgentId, IdentifierError, JobId, ProjectId};
