//! Read-only level geometry consumed by the behavior core.
//!
//! The level collaborator implements [`GeometryOracle`] once and the same
//! instance is shared by the movement solver, the state machine (search
//! patterns, room lookups) and the coordinator (room sweeps, doorways).

use crate::geometry::Vec2;

/// Default tile edge length in world pixels.
pub const DEFAULT_TILE_SIZE: f32 = 32.0;

/// Static level geometry oracle.
pub trait GeometryOracle: Send + Sync {
    /// Returns true when the world point lies inside solid geometry.
    fn is_wall_at(&self, point: Vec2) -> bool;

    /// Ordered points a searching guard should visit around `origin`.
    fn generate_search_pattern(&self, origin: Vec2) -> Vec<Vec2>;

    /// Room containing `point`, if the level defines one.
    fn room_at(&self, _point: Vec2) -> Option<RoomBounds> {
        None
    }

    /// All rooms known to the level.
    fn rooms(&self) -> Vec<RoomBounds> {
        Vec::new()
    }

    fn tile_size(&self) -> f32 {
        DEFAULT_TILE_SIZE
    }

    /// Nearest doorway centre within `radius` of `point`.
    ///
    /// The default implementation treats an open tile as a doorway when both
    /// neighbours on one axis are walls while both neighbours on the other
    /// axis are open.
    fn doorway_near(&self, point: Vec2, radius: f32) -> Option<Vec2> {
        let tile = self.tile_size();
        let reach = (radius / tile).ceil() as i32;
        let origin_x = (point.x / tile).floor();
        let origin_y = (point.y / tile).floor();
        let radius_sq = radius * radius;

        let mut best: Option<(f32, Vec2)> = None;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let center = Vec2::new(
                    (origin_x + dx as f32) * tile + tile * 0.5,
                    (origin_y + dy as f32) * tile + tile * 0.5,
                );
                let dist_sq = center.distance_squared(point);
                if dist_sq > radius_sq || !is_doorway_tile(self, center, tile) {
                    continue;
                }
                if best.is_none_or(|(d, _)| dist_sq < d) {
                    best = Some((dist_sq, center));
                }
            }
        }
        best.map(|(_, center)| center)
    }
}

fn is_doorway_tile<G: GeometryOracle + ?Sized>(geometry: &G, center: Vec2, tile: f32) -> bool {
    if geometry.is_wall_at(center) {
        return false;
    }
    let east = geometry.is_wall_at(center + Vec2::new(tile, 0.0));
    let west = geometry.is_wall_at(center + Vec2::new(-tile, 0.0));
    let south = geometry.is_wall_at(center + Vec2::new(0.0, tile));
    let north = geometry.is_wall_at(center + Vec2::new(0.0, -tile));

    (east && west && !north && !south) || (north && south && !east && !west)
}

/// Axis-aligned room rectangle in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoomBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl RoomBounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: Vec2::new(min.x.min(max.x), min.y.min(max.y)),
            max: Vec2::new(min.x.max(max.x), min.y.max(max.y)),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.min.lerp(self.max, 0.5)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Centre plus four perimeter points inset from the corners.
    ///
    /// `density` above 1.0 adds the four mid-edge points as well. The inset is
    /// clamped so that points never cross the room centre on narrow rooms.
    pub fn sweep_points(&self, inset: f32, density: f32) -> Vec<Vec2> {
        let inset_x = inset.min(self.width() * 0.5);
        let inset_y = inset.min(self.height() * 0.5);
        let (left, right) = (self.min.x + inset_x, self.max.x - inset_x);
        let (top, bottom) = (self.min.y + inset_y, self.max.y - inset_y);

        let mut points = vec![
            self.center(),
            Vec2::new(left, top),
            Vec2::new(right, top),
            Vec2::new(right, bottom),
            Vec2::new(left, bottom),
        ];

        if density > 1.0 {
            let center = self.center();
            points.extend([
                Vec2::new(center.x, top),
                Vec2::new(right, center.y),
                Vec2::new(center.x, bottom),
                Vec2::new(left, center.y),
            ]);
        }
        points
    }
}
