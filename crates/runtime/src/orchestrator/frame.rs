//! Per-frame input and output of a guard update.

use guard_core::{
    BehaviorState, StateMachineError, StuckFlags, TacticalRole, Timestamp, Transition, Vec2,
};

/// Sensed inputs for one guard on one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInput {
    pub position: Vec2,
    pub velocity: Vec2,
    /// 0 = unaware, ≥ 2 = definite detection.
    pub awareness: f32,
    pub player_visible: bool,
    pub player_position: Option<Vec2>,
    pub player_velocity: Vec2,
    /// Host movement speed before state and difficulty multipliers.
    pub base_speed: f32,
    pub now: Timestamp,
    pub dt_ms: f32,
}

impl FrameInput {
    /// Idle frame at `position`: no player sensed.
    pub fn idle(position: Vec2, base_speed: f32, now: Timestamp, dt_ms: f32) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            awareness: 0.0,
            player_visible: false,
            player_position: None,
            player_velocity: Vec2::ZERO,
            base_speed,
            now,
            dt_ms,
        }
    }
}

/// Steering decision for one guard on one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutput {
    pub velocity: Vec2,
    /// Facing angle in radians.
    pub facing: f32,
    pub state: BehaviorState,
    pub role: TacticalRole,
    pub waypoint_reached: bool,
    /// Point the host should move the guard back to after a severe stall.
    pub backup_position: Option<Vec2>,
    pub needs_recovery: bool,
    pub stuck_flags: StuckFlags,
    pub transition: Option<Transition>,
    /// Input was rejected; the host must not move the guard this frame.
    pub skipped: bool,
    pub error: Option<StateMachineError>,
}

impl FrameOutput {
    pub fn skipped(
        state: BehaviorState,
        role: TacticalRole,
        facing: f32,
        error: StateMachineError,
    ) -> Self {
        Self {
            velocity: Vec2::ZERO,
            facing,
            state,
            role,
            waypoint_reached: false,
            backup_position: None,
            needs_recovery: false,
            stuck_flags: StuckFlags::empty(),
            transition: None,
            skipped: true,
            error: Some(error),
        }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }
}
