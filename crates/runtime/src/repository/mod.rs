//! Repository layer for rollout metrics.
//!
//! The aggregate document is the only durable artifact the runtime owns.
//! Behavior state is never persisted.

mod error;
mod file;
mod memory;
mod traits;

pub use error::{RepositoryError, Result};
pub use file::FileAggregateRepository;
pub use memory::InMemoryAggregateRepository;
pub use traits::AggregateRepository;
