//! Doorway contention: which guard passes first through a shared chokepoint.

use guard_core::{BehaviorState, TacticalRole, Timestamp, Vec2};

use super::GuardHandle;

/// Doorway identity, bucketed to tile granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DoorwayKey {
    pub column: i32,
    pub row: i32,
}

impl DoorwayKey {
    /// Tile containing `point`: positions floor to their tile, so a doorway
    /// reported at a tile centre and any point inside that tile share a key.
    pub fn from_point(point: Vec2, tile_size: f32) -> Self {
        let tile = if tile_size > 0.0 { tile_size } else { 1.0 };
        Self {
            column: (point.x / tile).floor() as i32,
            row: (point.y / tile).floor() as i32,
        }
    }
}

/// Right of way: higher alert states first, then role.
pub fn contention_priority(state: BehaviorState, role: TacticalRole) -> u32 {
    u32::from(state.alert_priority()) * 10 + u32::from(role.priority())
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contender {
    pub handle: GuardHandle,
    pub priority: u32,
    /// Distance to the doorway at resolution time.
    pub distance: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContentionOutcome {
    pub winner: GuardHandle,
    pub yielding: Vec<GuardHandle>,
}

/// Orders contenders by priority, then by distance (closer wins).
///
/// Exact ties fall back to handle order so the result is deterministic.
pub fn resolve_contention(contenders: &[Contender]) -> Option<ContentionOutcome> {
    if contenders.len() < 2 {
        return None;
    }
    let mut ranked = contenders.to_vec();
    ranked.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.distance.total_cmp(&b.distance))
            .then(a.handle.cmp(&b.handle))
    });
    let winner = ranked[0].handle;
    let yielding = ranked[1..].iter().map(|c| c.handle).collect();
    Some(ContentionOutcome { winner, yielding })
}

/// Sidestep for a yielding guard: perpendicular to its approach.
pub fn yield_direction(position: Vec2, doorway: Vec2, velocity: Vec2) -> Vec2 {
    let approach = (doorway - position).normalize_or_zero();
    let approach = if approach.is_zero() {
        velocity.normalize_or_zero()
    } else {
        approach
    };
    if approach.is_zero() {
        Vec2::new(0.0, 1.0)
    } else {
        approach.perpendicular_right()
    }
}

/// Active conflict tracked by the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub struct DoorwayConflict {
    pub doorway: Vec2,
    pub winner: GuardHandle,
    /// Yielding guards with their sidestep directions.
    pub yielding: Vec<(GuardHandle, Vec2)>,
    pub since: Timestamp,
}

impl DoorwayConflict {
    pub fn involves(&self, handle: GuardHandle) -> bool {
        self.winner == handle || self.yielding.iter().any(|(h, _)| *h == handle)
    }
}
