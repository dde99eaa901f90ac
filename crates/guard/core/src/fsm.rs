//! Hysteresis-governed behavior state machine for one guard.
//!
//! ```text
//!            ┌────────────────── Chase ◄───────── (any, definite detection)
//!            │ lost sight           │
//!            ▼                      │
//! Patrol ─► Investigate ─► SweepRoom ─► SearchPaths ─► ReturnToPatrol ─► Patrol
//!                  └──────────────────────►┘
//! ```
//!
//! Every transition, including timer expiry and list exhaustion, goes through
//! the same hysteresis gate: a minimum dwell since the previous transition,
//! scaled by the difficulty's reaction multiplier. Downgrades (lower alert
//! priority) need the longer downgrade window both since the last transition
//! and since the last downgrade.

use crate::config::StateMachineConfig;
use crate::difficulty::DifficultyProfile;
use crate::env::{GeometryOracle, RoomBounds};
use crate::error::StateMachineError;
use crate::geometry::{Timestamp, Vec2};
use crate::state::{BehaviorState, TacticalRole};

/// Sensed inputs for one update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateInput {
    pub now: Timestamp,
    /// 0 = unaware, ≥ 2 = definite detection.
    pub awareness: f32,
    pub player_visible: bool,
    pub player_position: Option<Vec2>,
    pub agent_position: Vec2,
    /// Current patrol waypoint, used as the return target.
    pub patrol_anchor: Option<Vec2>,
}

/// Why a transition happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionReason {
    Detected,
    LostSight,
    Suspicion,
    InvestigationExpired,
    SweepComplete,
    SearchComplete,
    ReturnedToPatrol,
    RoleOverride(TacticalRole),
    Forced,
}

/// A state change recorded by the machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub from: BehaviorState,
    pub to: BehaviorState,
    pub reason: TransitionReason,
    pub at: Timestamp,
}

impl Transition {
    pub fn is_downgrade(&self) -> bool {
        self.from.is_downgrade_to(self.to)
    }
}

/// Result of a successful update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateStep {
    pub state: BehaviorState,
    pub transition: Option<Transition>,
}

/// Behavior state machine for a single guard.
#[derive(Clone, Debug)]
pub struct StateMachine {
    config: StateMachineConfig,
    difficulty: DifficultyProfile,
    state: BehaviorState,
    previous: BehaviorState,
    timer_ms: f32,
    last_transition_at: Option<Timestamp>,
    last_downgrade_at: Option<Timestamp>,
    last_known_player: Option<Vec2>,
    waypoints: Vec<Vec2>,
    waypoint_index: usize,
    return_target: Option<Vec2>,
    return_reached: bool,
    room: Option<RoomBounds>,
    applied_role: TacticalRole,
    error: Option<StateMachineError>,
}

impl StateMachine {
    pub fn new(config: StateMachineConfig, difficulty: DifficultyProfile) -> Self {
        Self {
            config,
            difficulty,
            state: BehaviorState::Patrol,
            previous: BehaviorState::Patrol,
            timer_ms: 0.0,
            last_transition_at: None,
            last_downgrade_at: None,
            last_known_player: None,
            waypoints: Vec::new(),
            waypoint_index: 0,
            return_target: None,
            return_reached: false,
            room: None,
            applied_role: TacticalRole::Unassigned,
            error: None,
        }
    }

    /// Evaluates the transition rules for one frame.
    ///
    /// Invalid input marks the machine invalid and returns the error without
    /// touching any state; callers skip movement for that frame.
    pub fn update<G: GeometryOracle + ?Sized>(
        &mut self,
        input: &StateInput,
        dt_ms: f32,
        env: &G,
    ) -> Result<StateStep, StateMachineError> {
        if !input.awareness.is_finite() || input.awareness < 0.0 {
            return Err(self.invalidate(StateMachineError::InvalidAwareness {
                value: input.awareness,
            }));
        }
        if !dt_ms.is_finite() || dt_ms < 0.0 {
            return Err(self.invalidate(StateMachineError::InvalidElapsed { dt_ms }));
        }
        self.error = None;
        self.timer_ms = (self.timer_ms - dt_ms).max(0.0);

        let mut transition = None;
        if let Some((next, reason)) = self.evaluate(input, env)
            && self.may_transition(next, input.now)
        {
            transition = Some(self.enter(next, reason, input, env));
        }

        if self.state == BehaviorState::Chase
            && input.player_visible
            && let Some(player) = input.player_position
        {
            self.last_known_player = Some(player);
        }

        Ok(StateStep {
            state: self.state,
            transition,
        })
    }

    fn invalidate(&mut self, error: StateMachineError) -> StateMachineError {
        tracing::warn!(%error, state = %self.state, "rejecting behavior update");
        self.error = Some(error.clone());
        error
    }

    fn evaluate<G: GeometryOracle + ?Sized>(
        &self,
        input: &StateInput,
        env: &G,
    ) -> Option<(BehaviorState, TransitionReason)> {
        let detected = input.awareness >= self.config.chase_threshold
            && input.player_visible
            && input.player_position.is_some();
        let suspicious = input.awareness >= self.config.investigate_threshold;
        let expired = self.timer_ms <= 0.0;

        match self.state {
            BehaviorState::Chase if !input.player_visible => {
                Some((BehaviorState::SearchPaths, TransitionReason::LostSight))
            }
            BehaviorState::Chase => None,
            _ if detected => Some((BehaviorState::Chase, TransitionReason::Detected)),
            BehaviorState::Patrol | BehaviorState::ReturnToPatrol if suspicious => {
                Some((BehaviorState::Investigate, TransitionReason::Suspicion))
            }
            BehaviorState::Investigate if expired => {
                let origin = self.last_known_player.unwrap_or(input.agent_position);
                let next = if env.room_at(origin).is_some() {
                    BehaviorState::SweepRoom
                } else {
                    BehaviorState::SearchPaths
                };
                Some((next, TransitionReason::InvestigationExpired))
            }
            BehaviorState::SweepRoom if expired || self.waypoints_exhausted() => {
                Some((BehaviorState::SearchPaths, TransitionReason::SweepComplete))
            }
            BehaviorState::SearchPaths if expired || self.waypoints_exhausted() => {
                Some((BehaviorState::ReturnToPatrol, TransitionReason::SearchComplete))
            }
            BehaviorState::ReturnToPatrol if expired || self.return_reached => {
                Some((BehaviorState::Patrol, TransitionReason::ReturnedToPatrol))
            }
            _ => None,
        }
    }

    /// Hysteresis gate shared by every non-forced transition.
    fn may_transition(&self, next: BehaviorState, now: Timestamp) -> bool {
        if next == self.state {
            return false;
        }
        let Some(last) = self.last_transition_at else {
            return true;
        };
        let since = now.since(last);
        if since < self.hysteresis_ms() {
            return false;
        }
        if self.state.is_downgrade_to(next) {
            let window = self.downgrade_hysteresis_ms();
            if since < window {
                return false;
            }
            if self
                .last_downgrade_at
                .is_some_and(|at| now.since(at) < window)
            {
                return false;
            }
        }
        true
    }

    /// Applies entry actions for `next` and records the transition.
    fn enter<G: GeometryOracle + ?Sized>(
        &mut self,
        next: BehaviorState,
        reason: TransitionReason,
        input: &StateInput,
        env: &G,
    ) -> Transition {
        let from = self.state;
        self.waypoints.clear();
        self.waypoint_index = 0;
        self.return_reached = false;

        match next {
            BehaviorState::Chase => {
                if input.player_visible
                    && let Some(player) = input.player_position
                {
                    self.last_known_player = Some(player);
                }
                self.room = None;
                self.timer_ms = 0.0;
            }
            BehaviorState::Investigate => {
                self.last_known_player = input
                    .player_position
                    .or(self.last_known_player)
                    .or(Some(input.agent_position));
                self.timer_ms = self.difficulty.search_ms(self.config.investigate_ms);
            }
            BehaviorState::SweepRoom => {
                let origin = self.last_known_player.unwrap_or(input.agent_position);
                self.room = env.room_at(origin);
                if let Some(room) = self.room {
                    self.waypoints =
                        room.sweep_points(self.config.sweep_inset, self.difficulty.sweep_density);
                }
                self.timer_ms = self.difficulty.search_ms(self.config.sweep_ms);
            }
            BehaviorState::SearchPaths => {
                let origin = self.last_known_player.unwrap_or(input.agent_position);
                self.waypoints = env.generate_search_pattern(origin);
                self.timer_ms = self.difficulty.search_ms(self.config.search_ms);
            }
            BehaviorState::ReturnToPatrol => {
                self.return_target = Some(input.patrol_anchor.unwrap_or(input.agent_position));
                self.timer_ms = self.config.return_timeout_ms;
            }
            BehaviorState::Patrol => {
                self.last_known_player = None;
                self.return_target = None;
                self.room = None;
                self.applied_role = TacticalRole::Unassigned;
                self.timer_ms = 0.0;
            }
        }

        self.previous = from;
        self.state = next;
        self.last_transition_at = Some(input.now);
        if from.is_downgrade_to(next) {
            self.last_downgrade_at = Some(input.now);
        }

        tracing::debug!(from = %from, to = %next, ?reason, at = %input.now, "behavior transition");

        Transition {
            from,
            to: next,
            reason,
            at: input.now,
        }
    }

    /// Lets a coordinator role pull the guard into a tactical state.
    ///
    /// Each assignment is applied at most once; a guard that later drops out
    /// of the forced state follows its own rules until the role changes.
    pub fn apply_role<G: GeometryOracle + ?Sized>(
        &mut self,
        role: TacticalRole,
        alert_origin: Option<Vec2>,
        input: &StateInput,
        env: &G,
    ) -> Option<Transition> {
        if role == self.applied_role {
            return None;
        }
        if !role.is_assigned() {
            self.applied_role = role;
            return None;
        }

        let next = match role {
            TacticalRole::Pursuer if self.last_known_player.is_some() => BehaviorState::Chase,
            TacticalRole::Pursuer => {
                self.last_known_player = alert_origin;
                if alert_origin.is_some() {
                    BehaviorState::Chase
                } else {
                    return None;
                }
            }
            TacticalRole::Flanker if self.state == BehaviorState::Patrol => {
                self.last_known_player = self.last_known_player.or(alert_origin);
                BehaviorState::SearchPaths
            }
            TacticalRole::RoomChecker => {
                let origin = alert_origin
                    .or(self.last_known_player)
                    .unwrap_or(input.agent_position);
                if env.room_at(origin).is_none() {
                    return None;
                }
                self.last_known_player = self.last_known_player.or(Some(origin));
                BehaviorState::SweepRoom
            }
            _ => {
                self.applied_role = role;
                return None;
            }
        };

        if !self.may_transition(next, input.now) {
            return None;
        }
        self.applied_role = role;
        Some(self.enter(next, TransitionReason::RoleOverride(role), input, env))
    }

    /// Host-issued override; bypasses hysteresis.
    pub fn force_state<G: GeometryOracle + ?Sized>(
        &mut self,
        state: BehaviorState,
        input: &StateInput,
        env: &G,
    ) -> Transition {
        self.enter(state, TransitionReason::Forced, input, env)
    }

    /// Navigation target for the current state.
    pub fn target(&self, patrol_waypoint: Option<Vec2>) -> Option<Vec2> {
        match self.state {
            BehaviorState::Chase | BehaviorState::Investigate => self.last_known_player,
            BehaviorState::SweepRoom | BehaviorState::SearchPaths => {
                self.waypoints.get(self.waypoint_index).copied()
            }
            BehaviorState::ReturnToPatrol => self.return_target,
            BehaviorState::Patrol => patrol_waypoint,
        }
    }

    /// Advances the sweep/search list or marks the return target reached.
    ///
    /// An exhausted list is cleared; the next update treats it as complete.
    pub fn on_waypoint_reached(&mut self) {
        match self.state {
            BehaviorState::SweepRoom | BehaviorState::SearchPaths => {
                self.waypoint_index += 1;
                if self.waypoint_index >= self.waypoints.len() {
                    self.waypoints.clear();
                    self.waypoint_index = 0;
                }
            }
            BehaviorState::ReturnToPatrol => self.return_reached = true,
            BehaviorState::Patrol | BehaviorState::Investigate | BehaviorState::Chase => {}
        }
    }

    fn waypoints_exhausted(&self) -> bool {
        self.waypoint_index >= self.waypoints.len()
    }

    fn hysteresis_ms(&self) -> u64 {
        self.difficulty.reaction_ms(self.config.hysteresis_ms)
    }

    fn downgrade_hysteresis_ms(&self) -> u64 {
        self.difficulty.reaction_ms(self.config.downgrade_hysteresis_ms)
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.config.tuning(self.state).speed * self.difficulty.speed_multiplier
    }

    /// Squared reach distance for the current state's waypoint.
    pub fn reach_threshold_sq(&self) -> f32 {
        let reach = self.config.tuning(self.state).reach_distance;
        reach * reach
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    pub fn previous_state(&self) -> BehaviorState {
        self.previous
    }

    pub fn timer_ms(&self) -> f32 {
        self.timer_ms
    }

    pub fn last_known_player_position(&self) -> Option<Vec2> {
        self.last_known_player
    }

    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    pub fn waypoint_index(&self) -> usize {
        self.waypoint_index
    }

    pub fn room(&self) -> Option<RoomBounds> {
        self.room
    }

    pub fn last_transition_at(&self) -> Option<Timestamp> {
        self.last_transition_at
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn last_error(&self) -> Option<&StateMachineError> {
        self.error.as_ref()
    }

    pub fn difficulty(&self) -> &DifficultyProfile {
        &self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: DifficultyProfile) {
        self.difficulty = difficulty;
    }

    pub fn config(&self) -> &StateMachineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::Difficulty;

    struct Level {
        room: Option<RoomBounds>,
    }

    impl GeometryOracle for Level {
        fn is_wall_at(&self, _point: Vec2) -> bool {
            false
        }

        fn generate_search_pattern(&self, origin: Vec2) -> Vec<Vec2> {
            vec![origin + Vec2::new(32.0, 0.0), origin + Vec2::new(0.0, 32.0)]
        }

        fn room_at(&self, point: Vec2) -> Option<RoomBounds> {
            self.room.filter(|room| room.contains(point))
        }
    }

    fn open_level() -> Level {
        Level { room: None }
    }

    fn input(now: u64, awareness: f32, visible: bool) -> StateInput {
        StateInput {
            now: Timestamp(now),
            awareness,
            player_visible: visible,
            player_position: Some(Vec2::new(200.0, 200.0)),
            agent_position: Vec2::new(0.0, 0.0),
            patrol_anchor: Some(Vec2::new(-50.0, 0.0)),
        }
    }

    fn machine() -> StateMachine {
        StateMachine::new(StateMachineConfig::default(), DifficultyProfile::normal())
    }

    #[test]
    fn detection_enters_chase_and_records_player() {
        let mut fsm = machine();
        let step = fsm.update(&input(0, 2.5, true), 16.0, &open_level()).unwrap();
        assert_eq!(step.state, BehaviorState::Chase);
        assert_eq!(step.transition.unwrap().reason, TransitionReason::Detected);
        assert_eq!(fsm.last_known_player_position(), Some(Vec2::new(200.0, 200.0)));
        assert_eq!(fsm.target(None), Some(Vec2::new(200.0, 200.0)));
    }

    #[test]
    fn losing_sight_waits_for_downgrade_hysteresis() {
        let mut fsm = machine();
        let level = open_level();
        fsm.update(&input(0, 3.0, true), 16.0, &level).unwrap();

        let step = fsm.update(&input(500, 3.0, false), 16.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::Chase);

        let step = fsm.update(&input(1_200, 3.0, false), 16.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::SearchPaths);
        assert_eq!(fsm.waypoints().len(), 2);
    }

    #[test]
    fn investigation_expires_into_sweep_when_room_known() {
        let level = Level {
            room: Some(RoomBounds::new(Vec2::new(100.0, 100.0), Vec2::new(300.0, 300.0))),
        };
        let mut fsm = machine();
        let step = fsm.update(&input(0, 1.0, false), 16.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::Investigate);
        assert!((fsm.timer_ms() - 3_000.0).abs() < 1e-3);

        let mut now = 0;
        while fsm.state() == BehaviorState::Investigate {
            now += 100;
            fsm.update(&input(now, 0.0, false), 100.0, &level).unwrap();
            assert!(now < 10_000, "investigation never expired");
        }
        assert_eq!(fsm.state(), BehaviorState::SweepRoom);
        assert_eq!(fsm.waypoints().len(), 5);
        assert_eq!(fsm.target(None), Some(Vec2::new(200.0, 200.0)));
    }

    #[test]
    fn investigation_without_room_goes_to_search() {
        let mut fsm = machine();
        let level = open_level();
        fsm.update(&input(0, 1.5, false), 16.0, &level).unwrap();
        let step = fsm.update(&input(3_100, 0.0, false), 3_100.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::SearchPaths);
    }

    #[test]
    fn exhausted_search_returns_then_patrols() {
        let mut fsm = machine();
        let level = open_level();
        fsm.update(&input(0, 3.0, true), 16.0, &level).unwrap();
        fsm.update(&input(1_500, 0.0, false), 16.0, &level).unwrap();
        assert_eq!(fsm.state(), BehaviorState::SearchPaths);

        fsm.on_waypoint_reached();
        fsm.on_waypoint_reached();
        assert!(fsm.waypoints().is_empty());

        let step = fsm.update(&input(3_000, 0.0, false), 16.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::ReturnToPatrol);
        assert_eq!(fsm.target(None), Some(Vec2::new(-50.0, 0.0)));

        fsm.on_waypoint_reached();
        let step = fsm.update(&input(4_500, 0.0, false), 16.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::Patrol);
        assert_eq!(fsm.last_known_player_position(), None);
        assert_eq!(fsm.target(Some(Vec2::new(9.0, 9.0))), Some(Vec2::new(9.0, 9.0)));
    }

    #[test]
    fn invalid_awareness_leaves_state_untouched() {
        let mut fsm = machine();
        let level = open_level();
        fsm.update(&input(0, 2.0, true), 16.0, &level).unwrap();

        let err = fsm.update(&input(2_000, f32::NAN, false), 16.0, &level).unwrap_err();
        assert!(matches!(err, StateMachineError::InvalidAwareness { .. }));
        assert!(!fsm.is_valid());
        assert_eq!(fsm.state(), BehaviorState::Chase);

        assert!(fsm.update(&input(2_016, -1.0, false), 16.0, &level).is_err());
        assert_eq!(fsm.state(), BehaviorState::Chase);

        fsm.update(&input(2_032, 0.0, true), 16.0, &level).unwrap();
        assert!(fsm.is_valid());
    }

    #[test]
    fn harder_difficulty_shortens_hysteresis() {
        let level = open_level();
        let mut expert = StateMachine::new(StateMachineConfig::default(), Difficulty::Expert.profile());
        expert.update(&input(0, 3.0, true), 16.0, &level).unwrap();
        // Expert downgrade window is 600ms; normal would still be chasing.
        let step = expert.update(&input(650, 0.0, false), 16.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::SearchPaths);

        let mut normal = machine();
        normal.update(&input(0, 3.0, true), 16.0, &level).unwrap();
        let step = normal.update(&input(650, 0.0, false), 16.0, &level).unwrap();
        assert_eq!(step.state, BehaviorState::Chase);
    }

    #[test]
    fn speed_scales_with_state_and_difficulty() {
        let level = open_level();
        let mut fsm = StateMachine::new(StateMachineConfig::default(), Difficulty::Hard.profile());
        assert!((fsm.speed_multiplier() - 0.5 * 1.1).abs() < 1e-6);
        fsm.update(&input(0, 3.0, true), 16.0, &level).unwrap();
        assert!((fsm.speed_multiplier() - 1.2 * 1.1).abs() < 1e-6);
    }

    #[test]
    fn pursuer_role_forces_chase_once() {
        let level = open_level();
        let mut fsm = machine();
        let origin = Some(Vec2::new(80.0, 0.0));
        let first = fsm.apply_role(TacticalRole::Pursuer, origin, &input(0, 0.0, false), &level);
        assert_eq!(first.map(|t| t.to), Some(BehaviorState::Chase));
        assert_eq!(fsm.target(None), origin);

        fsm.update(&input(2_000, 0.0, false), 16.0, &level).unwrap();
        assert_eq!(fsm.state(), BehaviorState::SearchPaths);
        let again = fsm.apply_role(TacticalRole::Pursuer, origin, &input(4_000, 0.0, false), &level);
        assert!(again.is_none());
    }

    #[test]
    fn flanker_only_pulls_from_patrol() {
        let level = open_level();
        let mut fsm = machine();
        let t = fsm.apply_role(
            TacticalRole::Flanker,
            Some(Vec2::new(10.0, 10.0)),
            &input(0, 0.0, false),
            &level,
        );
        assert_eq!(t.map(|t| t.to), Some(BehaviorState::SearchPaths));

        let mut investigating = machine();
        investigating.update(&input(0, 1.0, false), 16.0, &level).unwrap();
        let t = investigating.apply_role(
            TacticalRole::Flanker,
            None,
            &input(1_000, 1.0, false),
            &level,
        );
        assert!(t.is_none());
    }

    #[test]
    fn forced_state_bypasses_hysteresis() {
        let level = open_level();
        let mut fsm = machine();
        fsm.update(&input(0, 3.0, true), 16.0, &level).unwrap();
        let t = fsm.force_state(BehaviorState::Patrol, &input(10, 0.0, false), &level);
        assert_eq!(t.reason, TransitionReason::Forced);
        assert_eq!(fsm.state(), BehaviorState::Patrol);
        assert_eq!(fsm.previous_state(), BehaviorState::Chase);
    }

    /// Deterministic awareness noise; no transition may beat the hysteresis.
    #[test]
    fn transitions_never_closer_than_hysteresis() {
        let level = Level {
            room: Some(RoomBounds::new(Vec2::new(-500.0, -500.0), Vec2::new(500.0, 500.0))),
        };
        for difficulty in [Difficulty::Easy, Difficulty::Normal, Difficulty::Expert] {
            let mut fsm = StateMachine::new(StateMachineConfig::default(), difficulty.profile());
            let min_gap = difficulty.profile().reaction_ms(StateMachineConfig::default().hysteresis_ms);
            let mut seed: u32 = 0x9e37_79b9;
            let mut transitions = Vec::new();
            let mut now = 0u64;

            for _ in 0..5_000 {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let awareness = (seed >> 8) as f32 / (1u32 << 24) as f32 * 3.0;
                let visible = (seed & 0x3) == 0;
                now += 16;
                let step = fsm.update(&input(now, awareness, visible), 16.0, &level).unwrap();
                if (seed & 0x1f) == 7 {
                    fsm.on_waypoint_reached();
                }
                if let Some(t) = step.transition {
                    transitions.push(t.at);
                }
            }

            assert!(transitions.len() > 10, "sequence produced too few transitions");
            for pair in transitions.windows(2) {
                assert!(pair[1].since(pair[0]) >= min_gap, "{difficulty}: {:?}", pair);
            }
        }
    }
}
