//! File-based repository implementations.

mod aggregate;

pub use aggregate::FileAggregateRepository;
