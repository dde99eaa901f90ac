//! Flanking and room-check target computation.

use guard_core::{RoomBounds, Vec2};

use super::CoordinatorConfig;

/// Flanking position for a guard on `side` (+1 or -1).
///
/// A near-stationary player is circled: the guard heads for the point
/// opposite itself at `circle_radius`. A moving player is intercepted ahead of
/// its travel, offset by `flank_spread` toward the guard's side, at the
/// guard's current range clamped to the flank distance band.
pub fn flank_target(
    guard: Vec2,
    player: Vec2,
    player_velocity: Vec2,
    side: f32,
    config: &CoordinatorConfig,
) -> Vec2 {
    let speed = player_velocity.length();
    if speed < config.motion_threshold {
        let through = (player - guard).normalize_or_zero();
        let through = if through.is_zero() {
            Vec2::new(1.0, 0.0)
        } else {
            through
        };
        return player + through * config.circle_radius;
    }

    let travel = player_velocity * (1.0 / speed);
    let distance = guard
        .distance(player)
        .clamp(config.min_flank_distance, config.max_flank_distance);
    player + travel.rotated(side.signum() * config.flank_spread) * distance
}

/// Sweep points for the `count` rooms nearest to `from`.
///
/// Each room contributes its centre followed by four inset perimeter points.
pub fn room_check_points(rooms: &[RoomBounds], from: Vec2, count: usize, inset: f32) -> Vec<Vec2> {
    let mut ranked: Vec<&RoomBounds> = rooms.iter().collect();
    ranked.sort_by(|a, b| {
        a.center()
            .distance_squared(from)
            .total_cmp(&b.center().distance_squared(from))
    });
    ranked
        .into_iter()
        .take(count)
        .flat_map(|room| room.sweep_points(inset, 1.0))
        .collect()
}
