//! Guard behavior runtime: per-guard orchestration, squad coordination and
//! the staged rollout around them.
//!
//! The deterministic per-guard logic lives in `guard-core`; this crate wires it
//! into a frame pipeline and adds the shared state a level needs. Hosts create
//! one [`GuardOrchestrator`] per guard and one [`Coordinator`] per level, and
//! decide per level whether guards run orchestrated or on the
//! [`LegacyController`] through an [`EngineSelector`].
//!
//! Modules are organized by responsibility:
//! - [`orchestrator`] runs one guard's frame: state, stuck recovery, steering
//! - [`coordinator`] assigns squad roles and resolves doorway contention
//! - [`legacy`] and [`engine`] provide the fallback path and the routing to it
//! - [`rollout`] and [`metrics`] decide enablement and watch for regressions
//! - [`repository`] persists daily rollout aggregates
//! - [`diagnostics`] carries behavior events to tracing, metrics or tests
pub mod coordinator;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod legacy;
pub mod metrics;
pub mod orchestrator;
pub mod repository;
pub mod rollout;

pub use coordinator::{
    AlertState, ConflictSummary, CoordinationSnapshot, Coordinator, CoordinatorConfig,
    GuardHandle, GuardRecord, RoleAssignment,
};
pub use diagnostics::{
    Diagnostics, FanoutDiagnostics, GuardEvent, MetricsDiagnostics, NoopDiagnostics,
    RecordingDiagnostics, RecoveryKind, TracingDiagnostics,
};
pub use engine::{EnginePath, EngineSelector, GuardBrain};
pub use error::{Result, RuntimeError};
pub use legacy::{LegacyConfig, LegacyController};
pub use metrics::{
    AggregateDocument, HealthStatus, LevelAggregate, MetricSample, MetricsConfig, MetricsLogger,
    RollbackReason, RollbackRecommendation, SessionCounters, SessionSummary, level_key,
};
pub use orchestrator::{
    FrameInput, FrameOutput, GuardOrchestrator, GuardSetup, OrchestratorConfig, RecoveryConfig,
};
pub use repository::{
    AggregateRepository, FileAggregateRepository, InMemoryAggregateRepository, RepositoryError,
};
pub use rollout::{
    DecisionSource, FallbackConfig, FallbackManager, RollbackThresholds, RolloutConfig,
    RolloutDecision, RolloutOverride,
};
