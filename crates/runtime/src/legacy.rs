//! Direct-seek guard controller used when orchestration is off for a level.
//!
//! No stuck handling, coordination or hysteresis: the guard walks its patrol
//! route, walks to where it last noticed the player, chases on sight and
//! returns after a fixed alert timer. It never rejects input.

use guard_core::{
    AgentId, BehaviorState, LegacyState, StuckFlags, TacticalRole, Transition, TransitionReason,
    Vec2,
};

use crate::orchestrator::{FrameInput, FrameOutput};

#[derive(Clone, Debug, PartialEq)]
pub struct LegacyConfig {
    pub suspicion_threshold: f32,
    pub chase_threshold: f32,
    /// How long a suspicious or searching guard lingers before returning.
    pub alert_ms: f32,
    pub reach_distance: f32,
    pub patrol_speed: f32,
    pub alert_speed: f32,
    pub chase_speed: f32,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            suspicion_threshold: 1.0,
            chase_threshold: 2.0,
            alert_ms: 4_000.0,
            reach_distance: 16.0,
            patrol_speed: 0.5,
            alert_speed: 0.8,
            chase_speed: 1.2,
        }
    }
}

pub struct LegacyController {
    id: AgentId,
    config: LegacyConfig,
    patrol_route: Vec<Vec2>,
    patrol_index: usize,
    state: LegacyState,
    last_seen: Option<Vec2>,
    timer_ms: f32,
    facing: f32,
}

impl LegacyController {
    pub fn new(id: AgentId, patrol_route: Vec<Vec2>, config: LegacyConfig) -> Self {
        Self {
            id,
            config,
            patrol_route,
            patrol_index: 0,
            state: LegacyState::Patrolling,
            last_seen: None,
            timer_ms: 0.0,
            facing: 0.0,
        }
    }

    pub fn update(&mut self, input: &FrameInput) -> FrameOutput {
        let awareness = if input.awareness.is_finite() {
            input.awareness.max(0.0)
        } else {
            0.0
        };
        let dt_ms = if input.dt_ms.is_finite() {
            input.dt_ms.max(0.0)
        } else {
            0.0
        };
        self.timer_ms -= dt_ms;

        let previous = self.state;
        let reason = self.evaluate(input, awareness);
        let transition = reason.map(|reason| Transition {
            from: BehaviorState::from(previous),
            to: BehaviorState::from(self.state),
            reason,
            at: input.now,
        });
        if transition.is_some() {
            tracing::debug!(
                agent = %self.id,
                from = %previous,
                to = %self.state,
                "legacy transition"
            );
        }

        let target = match self.state {
            LegacyState::Patrolling | LegacyState::Returning => self.patrol_waypoint(),
            LegacyState::Suspicious | LegacyState::Searching | LegacyState::Alerted => {
                self.last_seen
            }
        };
        let speed = input.base_speed.max(0.0) * self.speed_multiplier();

        let mut waypoint_reached = false;
        let mut velocity = Vec2::ZERO;
        if let Some(point) = target {
            let offset = point - input.position;
            if offset.length_squared() < self.config.reach_distance * self.config.reach_distance {
                waypoint_reached = true;
                self.on_reached();
            } else {
                velocity = offset.with_length(speed);
            }
        }
        if !velocity.is_zero() {
            self.facing = velocity.angle();
        }

        FrameOutput {
            velocity,
            facing: self.facing,
            state: BehaviorState::from(self.state),
            role: TacticalRole::Unassigned,
            waypoint_reached,
            backup_position: None,
            needs_recovery: false,
            stuck_flags: StuckFlags::empty(),
            transition,
            skipped: false,
            error: None,
        }
    }

    fn evaluate(&mut self, input: &FrameInput, awareness: f32) -> Option<TransitionReason> {
        let sighted = input.player_position.filter(|_| input.player_visible);

        if awareness >= self.config.chase_threshold
            && let Some(player) = sighted
        {
            self.last_seen = Some(player);
            self.timer_ms = self.config.alert_ms;
            return self.switch(LegacyState::Alerted, TransitionReason::Detected);
        }

        match self.state {
            LegacyState::Alerted => {
                self.timer_ms = self.config.alert_ms;
                self.switch(LegacyState::Searching, TransitionReason::LostSight)
            }
            LegacyState::Patrolling | LegacyState::Returning
                if awareness >= self.config.suspicion_threshold =>
            {
                self.last_seen = input.player_position.or(Some(input.position));
                self.timer_ms = self.config.alert_ms;
                self.switch(LegacyState::Suspicious, TransitionReason::Suspicion)
            }
            LegacyState::Suspicious | LegacyState::Searching if self.timer_ms <= 0.0 => {
                self.last_seen = None;
                self.switch(LegacyState::Returning, TransitionReason::SearchComplete)
            }
            _ => None,
        }
    }

    fn switch(&mut self, next: LegacyState, reason: TransitionReason) -> Option<TransitionReason> {
        if next == self.state {
            return None;
        }
        self.state = next;
        Some(reason)
    }

    fn on_reached(&mut self) {
        match self.state {
            LegacyState::Patrolling => {
                if !self.patrol_route.is_empty() {
                    self.patrol_index = (self.patrol_index + 1) % self.patrol_route.len();
                }
            }
            LegacyState::Returning => self.state = LegacyState::Patrolling,
            // Linger at the last sighting until the alert timer runs out.
            LegacyState::Suspicious | LegacyState::Searching | LegacyState::Alerted => {}
        }
    }

    fn speed_multiplier(&self) -> f32 {
        match self.state {
            LegacyState::Patrolling | LegacyState::Returning => self.config.patrol_speed,
            LegacyState::Suspicious | LegacyState::Searching => self.config.alert_speed,
            LegacyState::Alerted => self.config.chase_speed,
        }
    }

    fn patrol_waypoint(&self) -> Option<Vec2> {
        self.patrol_route.get(self.patrol_index).copied()
    }

    /// Resumes the patrol at `index`, used when taking over from the
    /// orchestrator.
    pub fn resume_patrol(&mut self, index: usize) {
        if !self.patrol_route.is_empty() {
            self.patrol_index = index % self.patrol_route.len();
        }
        self.state = LegacyState::Returning;
        self.last_seen = None;
        self.timer_ms = 0.0;
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn state(&self) -> LegacyState {
        self.state
    }

    pub fn patrol_index(&self) -> usize {
        self.patrol_index
    }

    pub fn last_seen(&self) -> Option<Vec2> {
        self.last_seen
    }

    pub fn timer_ms(&self) -> f32 {
        self.timer_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::Timestamp;

    fn controller() -> LegacyController {
        LegacyController::new(
            AgentId(1),
            vec![Vec2::new(100.0, 0.0), Vec2::new(0.0, 100.0)],
            LegacyConfig::default(),
        )
    }

    fn frame(now: u64) -> FrameInput {
        FrameInput::idle(Vec2::ZERO, 100.0, Timestamp(now), 100.0)
    }

    #[test]
    fn walks_patrol_route() {
        let mut legacy = controller();
        let out = legacy.update(&frame(0));
        assert_eq!(out.state, BehaviorState::Patrol);
        assert!((out.velocity.x - 50.0).abs() < 1e-3);
        assert!(out.transition.is_none());
    }

    #[test]
    fn chases_on_sight_then_searches_then_returns() {
        let mut legacy = controller();
        let mut input = frame(0);
        input.awareness = 3.0;
        input.player_visible = true;
        input.player_position = Some(Vec2::new(0.0, 200.0));
        let out = legacy.update(&input);
        assert_eq!(legacy.state(), LegacyState::Alerted);
        assert_eq!(out.transition.map(|t| t.reason), Some(TransitionReason::Detected));
        assert!((out.velocity.y - 120.0).abs() < 1e-3);

        let out = legacy.update(&frame(100));
        assert_eq!(legacy.state(), LegacyState::Searching);
        assert_eq!(out.transition.map(|t| t.to), Some(BehaviorState::SearchPaths));

        for i in 0..40 {
            legacy.update(&frame(200 + i * 100));
        }
        assert_eq!(legacy.state(), LegacyState::Returning);
        assert!(legacy.last_seen().is_none());
    }

    #[test]
    fn tolerates_invalid_awareness() {
        let mut legacy = controller();
        let mut input = frame(0);
        input.awareness = f32::NAN;
        let out = legacy.update(&input);
        assert!(!out.skipped);
        assert_eq!(legacy.state(), LegacyState::Patrolling);
    }

    #[test]
    fn resume_returns_to_given_waypoint() {
        let mut legacy = controller();
        legacy.resume_patrol(3);
        assert_eq!(legacy.patrol_index(), 1);
        assert_eq!(legacy.state(), LegacyState::Returning);
    }
}
