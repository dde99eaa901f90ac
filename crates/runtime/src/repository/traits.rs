//! Repository contract for the rollout aggregate document.

use super::Result;
use crate::metrics::AggregateDocument;

/// Storage for the daily rollout aggregates.
///
/// The document is small and rewritten whole on every session end, so the
/// contract is a plain load/save pair.
pub trait AggregateRepository: Send + Sync {
    /// Loads the stored document; a missing store yields an empty document.
    fn load(&self) -> Result<AggregateDocument>;

    /// Replaces the stored document.
    fn save(&self, document: &AggregateDocument) -> Result<()>;
}
