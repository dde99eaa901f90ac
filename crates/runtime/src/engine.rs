//! Routing each guard to the orchestrator or the legacy controller.

use std::sync::Arc;

use guard_core::{AgentId, BehaviorState, Timestamp};
use strum::Display;

use crate::coordinator::Coordinator;
use crate::diagnostics::{Diagnostics, GuardEvent};
use crate::legacy::LegacyController;
use crate::metrics::RollbackRecommendation;
use crate::orchestrator::{FrameInput, FrameOutput, GuardOrchestrator};
use crate::rollout::{FallbackManager, RolloutConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EnginePath {
    Orchestrator,
    Legacy,
}

/// Rollout switches plus the per-level fallback breaker.
#[derive(Clone, Debug, Default)]
pub struct EngineSelector {
    rollout: RolloutConfig,
    fallback: FallbackManager,
}

impl EngineSelector {
    pub fn new(rollout: RolloutConfig, fallback: FallbackManager) -> Self {
        Self { rollout, fallback }
    }

    /// Path for `level` at `now`: rollout decision first, then the breaker.
    pub fn select(&mut self, level: u32, now: Timestamp) -> EnginePath {
        if !self.rollout.is_enabled_for(level) || self.fallback.is_disabled(level, now) {
            EnginePath::Legacy
        } else {
            EnginePath::Orchestrator
        }
    }

    /// Feeds one guard's orchestrated frame into the breaker; returns true
    /// when this output trips it.
    pub fn observe(&mut self, level: u32, output: &FrameOutput, now: Timestamp) -> bool {
        output.skipped && self.fallback.record_error(level, now)
    }

    /// Marks the end of a frame after every guard on `level` was observed.
    pub fn end_frame(&mut self, level: u32) {
        self.fallback.end_frame(level);
    }

    /// Takes `level` off the canary list after a rollback recommendation.
    ///
    /// Overrides and the master switch still win over the list.
    pub fn roll_back(&mut self, level: u32, recommendation: &RollbackRecommendation) {
        if self.rollout.canary_levels.remove(&level) {
            tracing::warn!(
                level,
                reason = %recommendation.reason,
                rate = recommendation.rate,
                threshold = recommendation.threshold,
                "level removed from guard rollout"
            );
        }
    }

    pub fn rollout(&self) -> &RolloutConfig {
        &self.rollout
    }

    pub fn rollout_mut(&mut self) -> &mut RolloutConfig {
        &mut self.rollout
    }

    pub fn fallback(&self) -> &FallbackManager {
        &self.fallback
    }
}

/// One guard's two controllers behind a single update surface.
///
/// Switching paths detaches from (or re-attaches to) the coordinator and
/// hands the patrol position over, so a guard keeps walking its route.
pub struct GuardBrain {
    orchestrator: GuardOrchestrator,
    legacy: LegacyController,
    active: EnginePath,
    diagnostics: Arc<dyn Diagnostics>,
}

impl GuardBrain {
    pub fn new(
        orchestrator: GuardOrchestrator,
        legacy: LegacyController,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            orchestrator,
            legacy,
            active: EnginePath::Legacy,
            diagnostics,
        }
    }

    pub fn update(
        &mut self,
        path: EnginePath,
        input: &FrameInput,
        mut coordinator: Option<&mut Coordinator>,
    ) -> FrameOutput {
        if path != self.active {
            self.switch(path, input, coordinator.as_deref_mut());
        }
        match self.active {
            EnginePath::Orchestrator => self.orchestrator.update(input, coordinator),
            EnginePath::Legacy => self.legacy.update(input),
        }
    }

    /// Records the breaker tripping for this guard.
    pub fn report_fallback(&self, level: u32, now: Timestamp) {
        self.diagnostics.record(&GuardEvent::Fallback {
            agent: self.id(),
            level,
            at: now,
        });
    }

    fn switch(
        &mut self,
        path: EnginePath,
        input: &FrameInput,
        coordinator: Option<&mut Coordinator>,
    ) {
        tracing::info!(
            agent = %self.id(),
            from = %self.active,
            to = %path,
            "switching guard controller"
        );
        match path {
            EnginePath::Legacy => {
                if let Some(coordinator) = coordinator {
                    self.orchestrator.detach(coordinator);
                }
                self.legacy.resume_patrol(self.orchestrator.patrol_index());
            }
            EnginePath::Orchestrator => {
                if let Some(coordinator) = coordinator {
                    self.orchestrator.attach(coordinator, input.position, input.now);
                }
                if self.orchestrator.state() != BehaviorState::Patrol {
                    self.orchestrator.force_state(BehaviorState::ReturnToPatrol, input);
                }
            }
        }
        self.active = path;
    }

    pub fn id(&self) -> AgentId {
        self.orchestrator.id()
    }

    pub fn active(&self) -> EnginePath {
        self.active
    }

    pub fn orchestrator(&self) -> &GuardOrchestrator {
        &self.orchestrator
    }

    pub fn legacy(&self) -> &LegacyController {
        &self.legacy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollout::{FallbackConfig, RolloutOverride};
    use guard_core::StateMachineError;

    fn skipped() -> FrameOutput {
        FrameOutput::skipped(
            BehaviorState::Patrol,
            Default::default(),
            0.0,
            StateMachineError::InvalidElapsed { dt_ms: -1.0 },
        )
    }

    #[test]
    fn canary_list_selects_orchestrator() {
        let mut selector =
            EngineSelector::new(RolloutConfig::with_canary_levels([2]), FallbackManager::default());
        assert_eq!(selector.select(2, Timestamp(0)), EnginePath::Orchestrator);
        assert_eq!(selector.select(3, Timestamp(0)), EnginePath::Legacy);

        selector.rollout_mut().override_mode = Some(RolloutOverride::ForceDisable);
        assert_eq!(selector.select(2, Timestamp(0)), EnginePath::Legacy);
    }

    #[test]
    fn breaker_routes_to_legacy_until_cooldown() {
        let mut selector = EngineSelector::new(
            RolloutConfig::with_canary_levels([1]),
            FallbackManager::new(FallbackConfig {
                error_threshold: 2,
                cooldown_ms: 1_000,
            }),
        );
        assert!(!selector.observe(1, &skipped(), Timestamp(0)));
        assert!(selector.observe(1, &skipped(), Timestamp(16)));
        assert_eq!(selector.select(1, Timestamp(500)), EnginePath::Legacy);
        assert_eq!(selector.select(1, Timestamp(1_016)), EnginePath::Orchestrator);
    }

    fn clean() -> FrameOutput {
        let mut clean = skipped();
        clean.skipped = false;
        clean.error = None;
        clean
    }

    #[test]
    fn clean_frames_reset_error_count() {
        let mut selector =
            EngineSelector::new(RolloutConfig::with_canary_levels([1]), FallbackManager::default());
        selector.observe(1, &skipped(), Timestamp(0));
        selector.end_frame(1);
        selector.observe(1, &clean(), Timestamp(16));
        selector.end_frame(1);
        assert_eq!(selector.fallback().error_count(1), 0);
    }

    #[test]
    fn one_failing_guard_among_healthy_ones_trips_breaker() {
        let mut selector =
            EngineSelector::new(RolloutConfig::with_canary_levels([1]), FallbackManager::default());
        let mut tripped_at = None;
        for frame in 0..100u64 {
            let now = Timestamp(frame * 16);
            if selector.observe(1, &skipped(), now) {
                tripped_at.get_or_insert(frame);
            }
            selector.observe(1, &clean(), now);
            selector.end_frame(1);
        }
        assert_eq!(tripped_at, Some(2));
        assert_eq!(selector.select(1, Timestamp(100 * 16)), EnginePath::Legacy);
    }
}
