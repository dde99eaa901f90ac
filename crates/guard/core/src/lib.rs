//! Deterministic guard behavior shared by the runtime and offline tools.
//!
//! `guard-core` holds the per-guard decision logic (state machine, stuck
//! detection, obstacle-aware steering) and the data types the runtime builds
//! on. Nothing here performs I/O or reads a clock: every call receives the
//! current [`Timestamp`] and the elapsed milliseconds explicitly, and level
//! geometry is queried through the [`GeometryOracle`] trait.
pub mod awareness;
pub mod config;
pub mod difficulty;
pub mod env;
pub mod error;
pub mod fsm;
pub mod geometry;
pub mod movement;
pub mod state;
pub mod stuck;

pub use awareness::AwarenessMeter;
pub use config::{
    AwarenessConfig, FlipFlopMode, MovementConfig, StateMachineConfig, StateTuning, StuckConfig,
};
pub use difficulty::{Difficulty, DifficultyProfile};
pub use env::{DEFAULT_TILE_SIZE, GeometryOracle, RoomBounds};
pub use error::{ErrorSeverity, GuardError, StateMachineError};
pub use fsm::{StateInput, StateMachine, StateStep, Transition, TransitionReason};
pub use geometry::{Timestamp, Vec2, angle_delta, wrap_angle};
pub use movement::{AlternativeDirection, CandidateKind, MovementSolver};
pub use state::{AgentId, BehaviorState, LegacyState, TacticalRole};
pub use stuck::{
    Hotspot, RecoveryStrategy, RecoverySuggestion, StuckContext, StuckDetector, StuckFlags,
    StuckReport,
};
