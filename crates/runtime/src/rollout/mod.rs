//! Staged rollout: which levels run orchestrated guards, and when to stop.

mod config;
mod fallback;

pub use config::{
    DecisionSource, RollbackThresholds, RolloutConfig, RolloutDecision, RolloutOverride,
};
pub use fallback::{FallbackConfig, FallbackManager};
