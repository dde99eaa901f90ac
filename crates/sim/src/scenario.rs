//! Scenario files: level layout, guard placement and a scripted player.
//!
//! Positions are tile coordinates `(column, row)`; they are converted to
//! tile centres in world space when the simulation is built.

use std::path::Path;

use anyhow::{Context, Result, bail};
use guard_core::{Difficulty, RoomBounds, Vec2};
use serde::Deserialize;

use crate::map::TileMap;

pub type Tile = (u32, u32);

#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,
    pub map: Vec<String>,
    #[serde(default)]
    pub rooms: Vec<RoomSpec>,
    pub guards: Vec<GuardSpec>,
    pub player: PlayerSpec,
    #[serde(default = "default_frames")]
    pub frames: u32,
    #[serde(default = "default_dt_ms")]
    pub dt_ms: f32,
}

/// Room rectangle in tiles; `max` is exclusive.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RoomSpec {
    pub min: Tile,
    pub max: Tile,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GuardSpec {
    pub start: Tile,
    pub patrol: Vec<Tile>,
    #[serde(default = "default_guard_speed")]
    pub speed: f32,
}

/// Looping path the player walks at constant speed.
#[derive(Clone, Debug, Deserialize)]
pub struct PlayerSpec {
    pub path: Vec<Tile>,
    pub speed: f32,
}

fn default_tile_size() -> f32 {
    guard_core::DEFAULT_TILE_SIZE
}

fn default_frames() -> u32 {
    3_600
}

fn default_dt_ms() -> f32 {
    16.0
}

fn default_guard_speed() -> f32 {
    100.0
}

impl Scenario {
    /// Load scenario from a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        Self::from_ron(&content)
            .with_context(|| format!("Invalid scenario: {}", path.display()))
    }

    pub fn from_ron(content: &str) -> Result<Self> {
        let scenario: Scenario =
            ron::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse RON: {}", e))?;
        Ok(scenario)
    }

    /// Builds the tile map and checks every placement against it.
    pub fn build_map(&self) -> Result<TileMap> {
        let rooms = self
            .rooms
            .iter()
            .map(|room| {
                RoomBounds::new(
                    Vec2::new(room.min.0 as f32, room.min.1 as f32) * self.tile_size,
                    Vec2::new(room.max.0 as f32, room.max.1 as f32) * self.tile_size,
                )
            })
            .collect();
        let map = TileMap::from_rows(&self.map, self.tile_size, rooms)?;

        if self.guards.is_empty() {
            bail!("scenario {:?} has no guards", self.name);
        }
        if self.player.path.is_empty() {
            bail!("scenario {:?} has an empty player path", self.name);
        }
        if !(self.dt_ms > 0.0 && self.dt_ms.is_finite()) {
            bail!("dt_ms must be positive, got {}", self.dt_ms);
        }

        for (i, guard) in self.guards.iter().enumerate() {
            for tile in std::iter::once(&guard.start).chain(&guard.patrol) {
                ensure_open(&map, *tile).with_context(|| format!("guard {i}"))?;
            }
        }
        for tile in &self.player.path {
            ensure_open(&map, *tile).context("player path")?;
        }
        Ok(map)
    }
}

fn ensure_open(map: &TileMap, (x, y): Tile) -> Result<()> {
    if map.is_wall_tile(i64::from(x), i64::from(y)) {
        bail!("tile ({x}, {y}) is a wall or outside the map");
    }
    Ok(())
}
