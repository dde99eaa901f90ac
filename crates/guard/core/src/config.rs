//! Tunable parameters for each behavior component.
//!
//! Every component owns one strongly typed configuration struct. Defaults are
//! the shipped tuning; hosts override individual fields directly.

use crate::state::BehaviorState;

/// Obstacle probing and steering parameters for [`crate::MovementSolver`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MovementConfig {
    /// Lookahead distance in tiles along the travel direction.
    pub lookahead_factor: f32,
    /// Distance of the eight wall-clearance probes.
    pub clearance_distance: f32,
    /// Clearance force multiplier in open areas.
    pub clearance_multiplier: f32,
    /// Clearance force multiplier inside narrow corridors.
    pub narrow_clearance_multiplier: f32,
    /// Probe radius used to classify narrow corridors.
    pub corridor_probe_radius: f32,
    /// Blocked probes (out of 8) at which a corridor counts as narrow.
    pub narrow_corridor_threshold: usize,
    /// Weight of the previous velocity when smoothing, in [0, 1).
    pub smoothing_factor: f32,
    /// Interpolated samples checked along a candidate path.
    pub path_samples: usize,
    /// Side clearance required at each path sample.
    pub path_clearance: f32,
    /// Perturbation step for the fallback heading search, in degrees.
    pub fallback_step_degrees: f32,
    /// Maximum perturbation either side of the heading, in degrees.
    pub fallback_max_degrees: f32,
    /// Weight multiplier for candidates close to a recent heading while
    /// flip-flopping.
    pub flip_flop_penalty: f32,
    /// Cosine above which a candidate counts as similar to a recent heading.
    pub similarity_cosine: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            lookahead_factor: 1.5,
            clearance_distance: 20.0,
            clearance_multiplier: 0.3,
            narrow_clearance_multiplier: 0.6,
            corridor_probe_radius: 40.0,
            narrow_corridor_threshold: 4,
            smoothing_factor: 0.3,
            path_samples: 4,
            path_clearance: 8.0,
            fallback_step_degrees: 15.0,
            fallback_max_degrees: 90.0,
            flip_flop_penalty: 0.3,
            similarity_cosine: 0.9,
        }
    }
}

/// How flip-flopping is detected from the direction history.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlipFlopMode {
    /// Two consecutive reversals anywhere in the history.
    Basic,
    /// `min_reversals` consecutive reversals inside the trailing window.
    Enhanced { min_reversals: usize, window_ms: u64 },
}

/// Stuck, oscillation, doorway and hotspot parameters for
/// [`crate::StuckDetector`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StuckConfig {
    /// Frames in the displacement window.
    pub displacement_window: usize,
    /// Summed displacement below which a full window counts as stuck.
    pub min_displacement: f32,
    /// Frames in the position window.
    pub position_window: usize,
    /// Position standard deviation below which a full window oscillates.
    pub oscillation_threshold: f32,
    /// Entries kept in the direction history.
    pub direction_window: usize,
    /// Heading change (radians) required to append a direction sample.
    pub significant_turn: f32,
    /// Tolerance (radians) around π for a delta to count as a reversal.
    pub reversal_tolerance: f32,
    pub flip_flop: FlipFlopMode,
    /// Per-frame displacement treated as standing still in a doorway.
    pub doorway_idle_displacement: f32,
    /// Accumulated doorway idle time that flags doorway-stuck.
    pub doorway_min_ms: f32,
    /// Doorway timer decay rate relative to elapsed time while moving.
    pub doorway_decay_rate: f32,
    /// Stuck episodes closer than this merge into one hotspot.
    pub hotspot_radius: f32,
    /// Hotspot priority decays only after this much idle time.
    pub hotspot_idle_ms: u64,
    /// Milliseconds for one unit of hotspot priority to decay.
    pub hotspot_decay_ms: f32,
    /// Distance at which a guard steers away from a hotspot.
    pub hotspot_avoid_radius: f32,
    /// Minimum time between two recovery suggestions.
    pub strategy_cooldown_ms: u64,
    /// Minimum angular distance from history for a heading to be novel.
    pub novelty_threshold: f32,
    pub backup_base_distance: f32,
    pub backup_growth: f32,
    pub backup_max_distance: f32,
    /// Lifetime of a temporary escape waypoint.
    pub temporary_waypoint_ms: u64,
}

impl StuckConfig {
    /// Maximum number of hotspots tracked per guard.
    pub const MAX_HOTSPOTS: usize = 8;
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            displacement_window: 30,
            min_displacement: 5.0,
            position_window: 30,
            oscillation_threshold: 6.0,
            direction_window: 10,
            significant_turn: 0.5,
            reversal_tolerance: 0.35,
            flip_flop: FlipFlopMode::Enhanced {
                min_reversals: 2,
                window_ms: 2_000,
            },
            doorway_idle_displacement: 0.5,
            doorway_min_ms: 500.0,
            doorway_decay_rate: 0.5,
            hotspot_radius: 48.0,
            hotspot_idle_ms: 10_000,
            hotspot_decay_ms: 20_000.0,
            hotspot_avoid_radius: 64.0,
            strategy_cooldown_ms: 500,
            novelty_threshold: core::f32::consts::FRAC_PI_3,
            backup_base_distance: 24.0,
            backup_growth: 1.5,
            backup_max_distance: 96.0,
            temporary_waypoint_ms: 2_000,
        }
    }
}

/// Per-state tuning row.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateTuning {
    /// Base speed multiplier before difficulty scaling.
    pub speed: f32,
    /// Distance at which the state's waypoint counts as reached.
    pub reach_distance: f32,
}

/// Thresholds, durations and per-state tuning for [`crate::StateMachine`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateMachineConfig {
    /// Awareness at or above which the guard investigates.
    pub investigate_threshold: f32,
    /// Awareness at or above which the guard has definitely seen the player.
    pub chase_threshold: f32,
    /// Minimum dwell between transitions before difficulty scaling.
    pub hysteresis_ms: u64,
    /// Minimum dwell before a downgrade, before difficulty scaling.
    pub downgrade_hysteresis_ms: u64,
    pub investigate_ms: f32,
    pub sweep_ms: f32,
    pub search_ms: f32,
    pub return_timeout_ms: f32,
    /// Inset of sweep points from the room walls.
    pub sweep_inset: f32,
    pub patrol: StateTuning,
    pub investigate: StateTuning,
    pub sweep_room: StateTuning,
    pub search_paths: StateTuning,
    pub return_to_patrol: StateTuning,
    pub chase: StateTuning,
}

impl StateMachineConfig {
    pub fn tuning(&self, state: BehaviorState) -> StateTuning {
        match state {
            BehaviorState::Patrol => self.patrol,
            BehaviorState::Investigate => self.investigate,
            BehaviorState::SweepRoom => self.sweep_room,
            BehaviorState::SearchPaths => self.search_paths,
            BehaviorState::ReturnToPatrol => self.return_to_patrol,
            BehaviorState::Chase => self.chase,
        }
    }
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            investigate_threshold: 1.0,
            chase_threshold: 2.0,
            hysteresis_ms: 300,
            downgrade_hysteresis_ms: 1_200,
            investigate_ms: 3_000.0,
            sweep_ms: 10_000.0,
            search_ms: 8_000.0,
            return_timeout_ms: 6_000.0,
            sweep_inset: 24.0,
            patrol: StateTuning {
                speed: 0.5,
                reach_distance: 12.0,
            },
            investigate: StateTuning {
                speed: 0.7,
                reach_distance: 24.0,
            },
            sweep_room: StateTuning {
                speed: 0.75,
                reach_distance: 20.0,
            },
            search_paths: StateTuning {
                speed: 0.8,
                reach_distance: 20.0,
            },
            return_to_patrol: StateTuning {
                speed: 0.6,
                reach_distance: 16.0,
            },
            chase: StateTuning {
                speed: 1.2,
                reach_distance: 16.0,
            },
        }
    }
}

/// Integration parameters for [`crate::AwarenessMeter`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AwarenessConfig {
    /// Upper bound of the awareness scalar.
    pub max_level: f32,
    /// Rise per second with the player at point-blank range.
    pub gain_per_second: f32,
    /// Distance beyond which the player cannot be sensed.
    pub sight_range: f32,
    /// Fraction of the gain kept at the edge of sight range.
    pub min_range_factor: f32,
}

impl Default for AwarenessConfig {
    fn default() -> Self {
        Self {
            max_level: 3.0,
            gain_per_second: 2.5,
            sight_range: 256.0,
            min_range_factor: 0.25,
        }
    }
}
