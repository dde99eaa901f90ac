//! Unified error types surfaced by the runtime API.
//!
//! Wraps coordinator bookkeeping and repository failures so hosts can bubble
//! them up with consistent context. Per-frame behavior never returns these:
//! the orchestrator degrades to a skipped frame instead.

use thiserror::Error;

pub use crate::repository::RepositoryError;
use crate::coordinator::GuardHandle;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("guard handle {0} is stale or was never registered")]
    UnknownGuard(GuardHandle),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
