//! In-memory aggregate repository implementation.

use std::sync::RwLock;

use crate::metrics::AggregateDocument;
use crate::repository::{AggregateRepository, RepositoryError, Result};

/// In-memory aggregate repository for testing and development.
///
/// Thread-safe but not persistent across process restarts.
#[derive(Debug, Default)]
pub struct InMemoryAggregateRepository {
    document: RwLock<AggregateDocument>,
}

impl InMemoryAggregateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateRepository for InMemoryAggregateRepository {
    fn load(&self) -> Result<AggregateDocument> {
        let document = self
            .document
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(document.clone())
    }

    fn save(&self, document: &AggregateDocument) -> Result<()> {
        let mut stored = self
            .document
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        *stored = document.clone();
        Ok(())
    }
}
