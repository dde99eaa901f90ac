//! In-memory repository implementations for testing and development.

mod aggregate;

pub use aggregate::InMemoryAggregateRepository;
