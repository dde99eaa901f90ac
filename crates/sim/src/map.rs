//! Tile grid geometry for scenario levels.

use anyhow::{Result, bail};
use guard_core::{GeometryOracle, RoomBounds, Vec2};

/// Rectangular tile map: `#` is wall, `.` and `D` (doorway marker) are floor.
///
/// Everything outside the grid counts as wall.
#[derive(Clone, Debug)]
pub struct TileMap {
    tile_size: f32,
    width: usize,
    height: usize,
    walls: Vec<bool>,
    rooms: Vec<RoomBounds>,
}

impl TileMap {
    pub fn from_rows(rows: &[String], tile_size: f32, rooms: Vec<RoomBounds>) -> Result<Self> {
        if tile_size <= 0.0 || !tile_size.is_finite() {
            bail!("tile size must be positive, got {tile_size}");
        }
        let Some(width) = rows.first().map(|row| row.chars().count()) else {
            bail!("map has no rows");
        };

        let mut walls = Vec::with_capacity(width * rows.len());
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                bail!("map row {y} has {} tiles, expected {width}", row.chars().count());
            }
            for (x, tile) in row.chars().enumerate() {
                walls.push(match tile {
                    '#' => true,
                    '.' | 'D' => false,
                    other => bail!("unknown tile {other:?} at ({x}, {y})"),
                });
            }
        }

        Ok(Self {
            tile_size,
            width,
            height: rows.len(),
            walls,
            rooms,
        })
    }

    pub fn is_wall_tile(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return true;
        }
        self.walls[y as usize * self.width + x as usize]
    }

    /// World-space centre of tile `(x, y)`.
    pub fn tile_center(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) * self.tile_size,
            (y as f32 + 0.5) * self.tile_size,
        )
    }

    /// True when no wall lies on the segment between `from` and `to`.
    pub fn has_line_of_sight(&self, from: Vec2, to: Vec2) -> bool {
        let step = self.tile_size * 0.25;
        let steps = (from.distance(to) / step).ceil().max(1.0) as u32;
        (0..=steps).all(|i| !self.is_wall_at(from.lerp(to, i as f32 / steps as f32)))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

impl GeometryOracle for TileMap {
    fn is_wall_at(&self, point: Vec2) -> bool {
        if !point.is_finite() {
            return true;
        }
        let x = (point.x / self.tile_size).floor() as i64;
        let y = (point.y / self.tile_size).floor() as i64;
        self.is_wall_tile(x, y)
    }

    /// Compass ring three tiles out, keeping points that are open and in
    /// sight of the origin; falls back to the origin itself.
    fn generate_search_pattern(&self, origin: Vec2) -> Vec<Vec2> {
        let radius = self.tile_size * 3.0;
        let points: Vec<Vec2> = (0..8)
            .map(|i| origin + Vec2::from_angle(i as f32 * core::f32::consts::FRAC_PI_4) * radius)
            .filter(|point| !self.is_wall_at(*point) && self.has_line_of_sight(origin, *point))
            .collect();
        if points.is_empty() {
            vec![origin]
        } else {
            points
        }
    }

    fn room_at(&self, point: Vec2) -> Option<RoomBounds> {
        self.rooms.iter().find(|room| room.contains(point)).copied()
    }

    fn rooms(&self) -> Vec<RoomBounds> {
        self.rooms.clone()
    }

    fn tile_size(&self) -> f32 {
        self.tile_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    fn corridor() -> TileMap {
        TileMap::from_rows(
            &rows(&["#####", "#...#", "##D##", "#...#", "#####"]),
            32.0,
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn outside_the_grid_is_wall() {
        let map = corridor();
        assert!(map.is_wall_at(Vec2::new(-1.0, 40.0)));
        assert!(map.is_wall_at(Vec2::new(40.0, 1_000.0)));
        assert!(!map.is_wall_at(map.tile_center(1, 1)));
    }

    #[test]
    fn gap_in_wall_is_a_doorway() {
        let map = corridor();
        let door = map.tile_center(2, 2);
        assert_eq!(map.doorway_near(map.tile_center(2, 1), 40.0), Some(door));
    }

    #[test]
    fn line_of_sight_stops_at_walls() {
        let map = corridor();
        assert!(map.has_line_of_sight(map.tile_center(2, 1), map.tile_center(2, 3)));
        assert!(!map.has_line_of_sight(map.tile_center(1, 1), map.tile_center(1, 3)));
    }

    #[test]
    fn rejects_ragged_rows_and_unknown_tiles() {
        assert!(TileMap::from_rows(&rows(&["###", "##"]), 32.0, Vec::new()).is_err());
        assert!(TileMap::from_rows(&rows(&["#?#"]), 32.0, Vec::new()).is_err());
        assert!(TileMap::from_rows(&[], 32.0, Vec::new()).is_err());
    }

    #[test]
    fn search_pattern_skips_walls() {
        let map = corridor();
        let pattern = map.generate_search_pattern(map.tile_center(2, 1));
        assert!(pattern.iter().all(|p| !map.is_wall_at(*p)));
        assert!(!pattern.is_empty());
    }
}
