//! Per-guard frame pipeline.
//!
//! [`GuardOrchestrator`] glues one guard's state machine, stuck detector and
//! steering together, and talks to the shared [`Coordinator`] when attached.
//! One call to [`GuardOrchestrator::update`] per guard per frame:
//!
//! 1. state machine update (invalid input skips the frame)
//! 2. coordinator sync and role override
//! 3. stuck detection with doorway context
//! 4. target resolution: state target, then escape waypoint, then role target
//! 5. desired velocity with wall clearance and doorway yielding
//! 6. recovery steering when blocked or stuck
//! 7. smoothing and facing
//! 8. waypoint bookkeeping

mod frame;

use std::sync::Arc;

use guard_core::{
    AgentId, BehaviorState, CandidateKind, DifficultyProfile, GeometryOracle, MovementConfig,
    MovementSolver, StateInput, StateMachine, StateMachineConfig, StuckConfig, StuckContext,
    StuckDetector, StuckFlags, StuckReport, TacticalRole, Timestamp, Transition, Vec2,
};

pub use frame::{FrameInput, FrameOutput};

use crate::coordinator::{Coordinator, GuardHandle};
use crate::diagnostics::{Diagnostics, GuardEvent, RecoveryKind};

/// Component tuning plus the orchestrator's own recovery knobs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrchestratorConfig {
    pub movement: MovementConfig,
    pub stuck: StuckConfig,
    pub state_machine: StateMachineConfig,
    pub recovery: RecoveryConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecoveryConfig {
    /// Every this many consecutive stuck frames the guard is backed up.
    pub severe_stuck_frames: u32,
    /// Radius used to ask the geometry whether the guard is in a doorway.
    pub doorway_probe_radius: f32,
    /// Distance of the temporary escape waypoint along a recovery heading.
    pub escape_distance: f32,
    /// Sideways bias added while flip-flopping.
    pub flip_flop_bias: f32,
    /// Share of the yield direction while giving way at a doorway.
    pub yield_weight: f32,
    /// Rooms a room checker sweeps per assignment.
    pub rooms_per_check: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            severe_stuck_frames: 45,
            doorway_probe_radius: 40.0,
            escape_distance: 48.0,
            flip_flop_bias: 0.5,
            yield_weight: 0.8,
            rooms_per_check: 1,
        }
    }
}

/// Initial per-guard data supplied by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardSetup {
    pub patrol_route: Vec<Vec2>,
    pub difficulty: DifficultyProfile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TargetSource {
    Patrol,
    State,
    Escape,
    Flank,
    RoomCheck,
}

pub struct GuardOrchestrator {
    id: AgentId,
    config: OrchestratorConfig,
    geometry: Arc<dyn GeometryOracle>,
    diagnostics: Arc<dyn Diagnostics>,
    fsm: StateMachine,
    stuck: StuckDetector,
    patrol_route: Vec<Vec2>,
    patrol_index: usize,
    handle: Option<GuardHandle>,
    role: TacticalRole,
    room_checks: Vec<Vec2>,
    room_check_index: usize,
    facing: f32,
}

impl GuardOrchestrator {
    pub fn new(
        id: AgentId,
        setup: GuardSetup,
        config: OrchestratorConfig,
        geometry: Arc<dyn GeometryOracle>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        let fsm = StateMachine::new(config.state_machine.clone(), setup.difficulty);
        let stuck = StuckDetector::new(config.stuck.clone());
        Self {
            id,
            config,
            geometry,
            diagnostics,
            fsm,
            stuck,
            patrol_route: setup.patrol_route,
            patrol_index: 0,
            handle: None,
            role: TacticalRole::Unassigned,
            room_checks: Vec::new(),
            room_check_index: 0,
            facing: 0.0,
        }
    }

    /// Registers with `coordinator`, replacing any previous registration.
    pub fn attach(
        &mut self,
        coordinator: &mut Coordinator,
        position: Vec2,
        now: Timestamp,
    ) -> GuardHandle {
        if let Some(previous) = self.handle.take() {
            coordinator.unregister_guard(previous);
        }
        let handle = coordinator.register_guard(self.id, position, now);
        self.handle = Some(handle);
        handle
    }

    pub fn detach(&mut self, coordinator: &mut Coordinator) {
        if let Some(handle) = self.handle.take() {
            coordinator.unregister_guard(handle);
        }
        self.role = TacticalRole::Unassigned;
        self.room_checks.clear();
    }

    pub fn update(
        &mut self,
        input: &FrameInput,
        mut coordinator: Option<&mut Coordinator>,
    ) -> FrameOutput {
        let geometry = Arc::clone(&self.geometry);
        let env = geometry.as_ref();
        let movement = self.config.movement.clone();
        let state_input = self.state_input(input);

        // 1. Behavior state.
        let step = match self.fsm.update(&state_input, input.dt_ms, env) {
            Ok(step) => step,
            Err(error) => {
                self.diagnostics.record(&GuardEvent::InvalidInput {
                    agent: self.id,
                    error: error.clone(),
                    at: input.now,
                });
                return FrameOutput::skipped(self.fsm.state(), self.role, self.facing, error);
            }
        };
        let mut transition = step.transition;
        if let Some(t) = step.transition {
            self.report_transition(t);
        }

        // 2. Coordination.
        if let Some(coord) = coordinator.as_deref_mut()
            && let Some(t) = self.coordinate(coord, input, &state_input, env)
        {
            self.report_transition(t);
            transition = Some(t);
        }
        if let Some(coord) = coordinator.as_deref_mut()
            && transition.is_some_and(|t| t.to == BehaviorState::Chase)
        {
            let origin = self
                .fsm
                .last_known_player_position()
                .unwrap_or(input.position);
            coord.trigger_alert(origin, input.now);
        }

        // 3. Stuck detection.
        let near_doorway = env
            .doorway_near(input.position, self.config.recovery.doorway_probe_radius)
            .is_some();
        let report = self.stuck.update(
            input.position,
            input.now,
            StuckContext {
                near_doorway,
                dt_ms: input.dt_ms,
            },
        );
        if report.new_episode {
            self.diagnostics.record(&GuardEvent::StuckEpisode {
                agent: self.id,
                position: input.position,
                flags: report.flags,
                at: input.now,
            });
        }
        if !input.velocity.is_zero() {
            self.stuck.record_direction(input.velocity.angle(), input.now);
        }

        // 4. Target.
        let target = self.resolve_target(input, coordinator.as_deref());

        // 5. Desired velocity.
        let speed = (input.base_speed * self.fsm.speed_multiplier()).max(0.0);
        let solver = MovementSolver::new(env, &movement);
        let mut desired = target
            .map(|(point, _)| (point - input.position).normalize_or_zero() * speed)
            .unwrap_or(Vec2::ZERO);
        if !desired.is_zero() {
            let clearance = solver.wall_clearance_force(input.position)
                * (solver.clearance_multiplier(input.position) * speed);
            desired += clearance;
        }
        if let (Some(coord), Some(handle)) = (coordinator.as_deref(), self.handle)
            && let Some(direction) = coord.yield_direction(handle)
        {
            let weight = self.config.recovery.yield_weight.clamp(0.0, 1.0);
            desired = desired * (1.0 - weight) + direction * (speed * weight);
        }

        // 6. Recovery.
        let heading = if desired.is_zero() {
            input.velocity
        } else {
            desired
        };
        let obstacle = solver.has_obstacle_ahead(input.position, heading, speed);
        let needs_recovery = obstacle || report.flags.needs_recovery();
        let mut backup_position = None;
        if needs_recovery && speed > 0.0 {
            desired = self.recover(
                &solver,
                input,
                heading,
                desired,
                speed,
                target.map(|(p, _)| p),
                &report,
                obstacle,
            );

            let severe = self.config.recovery.severe_stuck_frames.max(1);
            if report.stuck_frames > 0
                && report.stuck_frames % severe == 0
                && let Some((point, _)) = target
            {
                backup_position = Some(self.stuck.calculate_backup_position(input.position, point));
                self.record_recovery(RecoveryKind::Backup, input);
            }
        }

        // 7. Smoothing.
        let velocity = if desired.is_zero() {
            Vec2::ZERO
        } else {
            solver.smooth_direction(desired, input.velocity, speed)
        };
        if !velocity.is_zero() {
            self.facing = velocity.angle();
        }

        // 8. Waypoints.
        let mut waypoint_reached = false;
        if let Some((point, source)) = target
            && input.position.distance_squared(point) < self.fsm.reach_threshold_sq()
        {
            waypoint_reached = true;
            self.on_reached(source);
        }

        FrameOutput {
            velocity,
            facing: self.facing,
            state: self.fsm.state(),
            role: self.role,
            waypoint_reached,
            backup_position,
            needs_recovery,
            stuck_flags: report.flags,
            transition,
            skipped: false,
            error: None,
        }
    }

    fn state_input(&self, input: &FrameInput) -> StateInput {
        StateInput {
            now: input.now,
            awareness: input.awareness,
            player_visible: input.player_visible,
            player_position: input.player_position,
            agent_position: input.position,
            patrol_anchor: self.patrol_waypoint(),
        }
    }

    fn coordinate(
        &mut self,
        coordinator: &mut Coordinator,
        input: &FrameInput,
        state_input: &StateInput,
        env: &dyn GeometryOracle,
    ) -> Option<Transition> {
        let handle = self.handle?;
        if let Err(error) =
            coordinator.update_guard(handle, input.position, self.fsm.state(), input.velocity)
        {
            tracing::warn!(agent = %self.id, %error, "detaching from coordinator");
            self.handle = None;
            self.role = TacticalRole::Unassigned;
            self.room_checks.clear();
            return None;
        }

        let role = coordinator.role(handle).unwrap_or_default();
        if role != self.role {
            self.role = role;
            self.room_check_index = 0;
            self.room_checks = if role == TacticalRole::RoomChecker {
                coordinator.room_check_targets(handle, self.config.recovery.rooms_per_check)
            } else {
                Vec::new()
            };
        }
        self.fsm
            .apply_role(role, coordinator.alert_origin(), state_input, env)
    }

    fn resolve_target(
        &self,
        input: &FrameInput,
        coordinator: Option<&Coordinator>,
    ) -> Option<(Vec2, TargetSource)> {
        let state = self.fsm.state();
        let source = if state == BehaviorState::Patrol {
            TargetSource::Patrol
        } else {
            TargetSource::State
        };
        let mut target = self
            .fsm
            .target(self.patrol_waypoint())
            .map(|point| (point, source));

        if let Some(escape) = self.stuck.temporary_waypoint(input.now) {
            target = Some((escape, TargetSource::Escape));
        }

        if !state.is_alerted() || state == BehaviorState::Chase {
            return target;
        }
        let (Some(coordinator), Some(handle)) = (coordinator, self.handle) else {
            return target;
        };
        match self.role {
            TacticalRole::Flanker => {
                let player = input
                    .player_position
                    .filter(|_| input.player_visible)
                    .or(self.fsm.last_known_player_position());
                if let Some(player) = player
                    && let Some(point) =
                        coordinator.flank_target(handle, player, input.player_velocity)
                {
                    target = Some((point, TargetSource::Flank));
                }
            }
            TacticalRole::RoomChecker => {
                if let Some(point) = self.room_checks.get(self.room_check_index) {
                    target = Some((*point, TargetSource::RoomCheck));
                }
            }
            TacticalRole::Pursuer | TacticalRole::Unassigned => {}
        }
        target
    }

    #[allow(clippy::too_many_arguments)]
    fn recover(
        &mut self,
        solver: &MovementSolver<'_, dyn GeometryOracle>,
        input: &FrameInput,
        heading: Vec2,
        desired: Vec2,
        speed: f32,
        target: Option<Vec2>,
        report: &StuckReport,
        obstacle: bool,
    ) -> Vec2 {
        let flip_flopping = report.flags.contains(StuckFlags::FLIP_FLOPPING);
        let escape = self.config.recovery.escape_distance;
        let mut direction = None;

        if report.flags.needs_recovery()
            && let Some(suggestion) =
                self.stuck
                    .suggested_recovery_direction(input.position, target, input.now)
        {
            self.stuck
                .set_temporary_waypoint(input.position + suggestion.direction * escape, input.now);
            self.record_recovery(RecoveryKind::Suggested(suggestion.strategy), input);
            direction = Some(suggestion.direction);
        }

        if direction.is_none() && (obstacle || report.flags.contains(StuckFlags::STUCK)) {
            let recent = self.stuck.recent_direction_angles();
            let alternative = solver.find_alternative_direction(
                input.position,
                heading,
                speed,
                &recent,
                flip_flopping,
            );
            match alternative.kind {
                CandidateKind::Forward => {}
                CandidateKind::Exhausted => {
                    self.stuck.set_temporary_waypoint(
                        input.position + alternative.direction * escape,
                        input.now,
                    );
                    self.record_recovery(RecoveryKind::Alternative(alternative.kind), input);
                }
                kind => self.record_recovery(RecoveryKind::Alternative(kind), input),
            }
            direction = Some(alternative.direction);
        }

        let mut steered = direction
            .filter(|d| !d.is_zero())
            .map(|d| d * speed)
            .unwrap_or(desired);
        if flip_flopping && !steered.is_zero() {
            let bias = steered.perpendicular_right() * self.config.recovery.flip_flop_bias;
            steered = (steered + bias).with_length(speed);
        }
        steered
    }

    fn on_reached(&mut self, source: TargetSource) {
        match source {
            TargetSource::Patrol => {
                if !self.patrol_route.is_empty() {
                    self.patrol_index = (self.patrol_index + 1) % self.patrol_route.len();
                }
            }
            TargetSource::State => self.fsm.on_waypoint_reached(),
            TargetSource::RoomCheck => {
                self.room_check_index += 1;
                if self.room_check_index >= self.room_checks.len() {
                    self.room_checks.clear();
                    self.room_check_index = 0;
                }
            }
            TargetSource::Escape | TargetSource::Flank => {}
        }
        self.stuck.clear_temporary_waypoint();
        self.stuck.reset();
    }

    fn report_transition(&self, transition: Transition) {
        self.diagnostics.record(&GuardEvent::Transition {
            agent: self.id,
            from: transition.from,
            to: transition.to,
            reason: transition.reason,
            at: transition.at,
        });
    }

    fn record_recovery(&self, strategy: RecoveryKind, input: &FrameInput) {
        self.diagnostics.record(&GuardEvent::RecoveryApplied {
            agent: self.id,
            strategy,
            at: input.now,
        });
    }

    fn patrol_waypoint(&self) -> Option<Vec2> {
        self.patrol_route.get(self.patrol_index).copied()
    }

    /// Host-issued state override; bypasses hysteresis.
    pub fn force_state(&mut self, state: BehaviorState, input: &FrameInput) -> Transition {
        let state_input = self.state_input(input);
        let transition = self
            .fsm
            .force_state(state, &state_input, self.geometry.as_ref());
        self.report_transition(transition);
        transition
    }

    pub fn set_difficulty(&mut self, difficulty: DifficultyProfile) {
        self.fsm.set_difficulty(difficulty);
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn state(&self) -> BehaviorState {
        self.fsm.state()
    }

    pub fn role(&self) -> TacticalRole {
        self.role
    }

    pub fn handle(&self) -> Option<GuardHandle> {
        self.handle
    }

    pub fn patrol_index(&self) -> usize {
        self.patrol_index
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.fsm
    }

    pub fn stuck_detector(&self) -> &StuckDetector {
        &self.stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::diagnostics::RecordingDiagnostics;
    use guard_core::StateMachineError;

    struct Arena;

    impl GeometryOracle for Arena {
        fn is_wall_at(&self, point: Vec2) -> bool {
            point.x.abs() > 1_000.0 || point.y.abs() > 1_000.0
        }

        fn generate_search_pattern(&self, origin: Vec2) -> Vec<Vec2> {
            vec![origin + Vec2::new(64.0, 0.0)]
        }
    }

    fn guard(diagnostics: Arc<RecordingDiagnostics>) -> GuardOrchestrator {
        GuardOrchestrator::new(
            AgentId(7),
            GuardSetup {
                patrol_route: vec![Vec2::new(100.0, 0.0), Vec2::new(100.0, 100.0)],
                difficulty: DifficultyProfile::normal(),
            },
            OrchestratorConfig::default(),
            Arc::new(Arena),
            diagnostics,
        )
    }

    #[test]
    fn patrol_heads_for_first_waypoint() {
        let mut orchestrator = guard(Arc::new(RecordingDiagnostics::new()));
        let input = FrameInput::idle(Vec2::ZERO, 100.0, Timestamp(0), 16.0);
        let out = orchestrator.update(&input, None);
        assert_eq!(out.state, BehaviorState::Patrol);
        assert!(!out.skipped);
        assert!((out.speed() - 50.0).abs() < 1e-3);
        assert!(out.velocity.x > 0.0 && out.velocity.y.abs() < 1e-3);
        assert!(out.facing.abs() < 1e-3);
    }

    #[test]
    fn reaching_patrol_waypoint_advances_route() {
        let mut orchestrator = guard(Arc::new(RecordingDiagnostics::new()));
        let out = orchestrator.update(
            &FrameInput::idle(Vec2::new(95.0, 0.0), 100.0, Timestamp(0), 16.0),
            None,
        );
        assert!(out.waypoint_reached);
        assert_eq!(orchestrator.patrol_index(), 1);
    }

    #[test]
    fn invalid_awareness_skips_frame() {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let mut orchestrator = guard(diagnostics.clone());
        let mut input = FrameInput::idle(Vec2::ZERO, 100.0, Timestamp(0), 16.0);
        input.awareness = -3.0;
        let out = orchestrator.update(&input, None);
        assert!(out.skipped);
        assert_eq!(out.velocity, Vec2::ZERO);
        assert!(matches!(
            out.error,
            Some(StateMachineError::InvalidAwareness { .. })
        ));
        assert_eq!(
            diagnostics.count(|e| matches!(e, GuardEvent::InvalidInput { .. })),
            1
        );
    }

    #[test]
    fn entering_chase_raises_coordinator_alert() {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let mut coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            Arc::new(Arena),
            diagnostics.clone(),
        );
        let mut orchestrator = guard(diagnostics.clone());
        orchestrator.attach(&mut coordinator, Vec2::ZERO, Timestamp(0));

        let mut input = FrameInput::idle(Vec2::ZERO, 100.0, Timestamp(0), 16.0);
        input.awareness = 2.5;
        input.player_visible = true;
        input.player_position = Some(Vec2::new(300.0, 0.0));
        let out = orchestrator.update(&input, Some(&mut coordinator));

        assert_eq!(out.state, BehaviorState::Chase);
        assert!((out.speed() - 120.0).abs() < 1e-3);
        assert_eq!(
            coordinator.alert().map(|a| a.origin),
            Some(Vec2::new(300.0, 0.0))
        );
        assert_eq!(
            diagnostics.count(|e| matches!(e, GuardEvent::Transition { .. })),
            1
        );
    }

    #[test]
    fn detached_handle_is_dropped_gracefully() {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let mut coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            Arc::new(Arena),
            diagnostics.clone(),
        );
        let mut orchestrator = guard(diagnostics);
        let handle = orchestrator.attach(&mut coordinator, Vec2::ZERO, Timestamp(0));
        coordinator.unregister_guard(handle);

        let out = orchestrator.update(
            &FrameInput::idle(Vec2::ZERO, 100.0, Timestamp(0), 16.0),
            Some(&mut coordinator),
        );
        assert!(!out.skipped);
        assert!(orchestrator.handle().is_none());
    }
}
