//! Obstacle-aware steering.
//!
//! [`MovementSolver`] is a pure function of the agent position and the level
//! geometry. It never stores state between frames; histories it needs (recent
//! headings) are passed in by the caller.

use core::f32::consts::FRAC_PI_4;

use crate::config::MovementConfig;
use crate::env::GeometryOracle;
use crate::geometry::Vec2;

/// Which candidate heading [`MovementSolver::find_alternative_direction`]
/// settled on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateKind {
    Forward,
    PerpendicularRight,
    PerpendicularLeft,
    DiagonalRight,
    DiagonalLeft,
    Reverse,
    /// Heading perturbed from the original in fixed steps.
    Perturbed,
    /// Nothing was clear; the reverse heading is returned as a last resort.
    Exhausted,
}

/// Result of the alternative heading search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlternativeDirection {
    /// Unit direction.
    pub direction: Vec2,
    pub kind: CandidateKind,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    direction: Vec2,
    weight: f32,
    kind: CandidateKind,
}

/// Steering helper bound to a geometry oracle and tuning.
pub struct MovementSolver<'a, G: GeometryOracle + ?Sized> {
    geometry: &'a G,
    config: &'a MovementConfig,
}

impl<'a, G: GeometryOracle + ?Sized> MovementSolver<'a, G> {
    pub fn new(geometry: &'a G, config: &'a MovementConfig) -> Self {
        Self { geometry, config }
    }

    fn lookahead_distance(&self) -> f32 {
        self.config.lookahead_factor * self.geometry.tile_size()
    }

    pub fn is_blocked(&self, x: f32, y: f32) -> bool {
        self.geometry.is_wall_at(Vec2::new(x, y))
    }

    fn is_blocked_at(&self, point: Vec2) -> bool {
        self.geometry.is_wall_at(point)
    }

    /// Tests the point `lookahead_factor` tiles ahead along `velocity`.
    ///
    /// `speed` only gates the probe: a stationary agent has nothing ahead.
    pub fn has_obstacle_ahead(&self, position: Vec2, velocity: Vec2, speed: f32) -> bool {
        let heading = velocity.normalize_or_zero();
        if heading.is_zero() || speed <= 0.0 {
            return false;
        }
        self.is_blocked_at(position + heading * self.lookahead_distance())
    }

    /// Sum of unit repulsions away from blocked compass probes.
    pub fn wall_clearance_force(&self, position: Vec2) -> Vec2 {
        let mut force = Vec2::ZERO;
        for direction in compass() {
            if self.is_blocked_at(position + direction * self.config.clearance_distance) {
                force -= direction;
            }
        }
        if force.length_squared() > 1.0 {
            force.normalize_or_zero()
        } else {
            force
        }
    }

    /// Counts blocked compass probes at the corridor radius.
    pub fn is_narrow_corridor(&self, position: Vec2) -> bool {
        let blocked = compass()
            .into_iter()
            .filter(|d| self.is_blocked_at(position + *d * self.config.corridor_probe_radius))
            .count();
        blocked >= self.config.narrow_corridor_threshold
    }

    /// Clearance multiplier for the current surroundings.
    pub fn clearance_multiplier(&self, position: Vec2) -> f32 {
        if self.is_narrow_corridor(position) {
            self.config.narrow_clearance_multiplier
        } else {
            self.config.clearance_multiplier
        }
    }

    /// Picks the best unobstructed heading near `heading`.
    ///
    /// `recent_angles` are headings (radians) the agent used recently; when
    /// `flip_flopping` is set, candidates similar or opposite to any of them
    /// are down-weighted so the agent breaks out of the back-and-forth.
    pub fn find_alternative_direction(
        &self,
        position: Vec2,
        heading: Vec2,
        speed: f32,
        recent_angles: &[f32],
        flip_flopping: bool,
    ) -> AlternativeDirection {
        let forward = heading.normalize_or_zero();
        if forward.is_zero() {
            return AlternativeDirection {
                direction: Vec2::ZERO,
                kind: CandidateKind::Exhausted,
            };
        }

        let mut candidates = [
            Candidate {
                direction: forward,
                weight: 1.0,
                kind: CandidateKind::Forward,
            },
            Candidate {
                direction: forward.perpendicular_right(),
                weight: 0.9,
                kind: CandidateKind::PerpendicularRight,
            },
            Candidate {
                direction: forward.perpendicular_left(),
                weight: 0.85,
                kind: CandidateKind::PerpendicularLeft,
            },
            Candidate {
                direction: forward.rotated(FRAC_PI_4),
                weight: 0.7,
                kind: CandidateKind::DiagonalRight,
            },
            Candidate {
                direction: forward.rotated(-FRAC_PI_4),
                weight: 0.65,
                kind: CandidateKind::DiagonalLeft,
            },
            Candidate {
                direction: -forward,
                weight: 0.2,
                kind: CandidateKind::Reverse,
            },
        ];

        if flip_flopping && !recent_angles.is_empty() {
            for candidate in &mut candidates {
                let repeats_history = recent_angles.iter().any(|angle| {
                    let cos = candidate.direction.dot(Vec2::from_angle(*angle));
                    cos > self.config.similarity_cosine || cos < -self.config.similarity_cosine
                });
                if repeats_history {
                    candidate.weight *= self.config.flip_flop_penalty;
                }
            }
        }

        candidates.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        if let Some(found) = candidates
            .iter()
            .find(|c| self.is_direction_clear(position, c.direction, speed))
        {
            return AlternativeDirection {
                direction: found.direction,
                kind: found.kind,
            };
        }

        let step = self.config.fallback_step_degrees.to_radians();
        let max = self.config.fallback_max_degrees.to_radians();
        let mut offset = step;
        while offset <= max + f32::EPSILON {
            for signed in [offset, -offset] {
                let direction = forward.rotated(signed);
                if self.is_direction_clear(position, direction, speed) {
                    return AlternativeDirection {
                        direction,
                        kind: CandidateKind::Perturbed,
                    };
                }
            }
            offset += step;
        }

        tracing::trace!(?position, "no clear heading found, reversing");
        AlternativeDirection {
            direction: -forward,
            kind: CandidateKind::Exhausted,
        }
    }

    /// Lookahead point clear and corridor clear along `direction`.
    fn is_direction_clear(&self, position: Vec2, direction: Vec2, speed: f32) -> bool {
        let lookahead = self.lookahead_distance();
        if speed > 0.0 && self.is_blocked_at(position + direction * lookahead) {
            return false;
        }
        self.is_path_clear(position, position + direction * lookahead)
    }

    fn is_path_clear(&self, from: Vec2, to: Vec2) -> bool {
        let samples = self.config.path_samples.max(1);
        let side = (to - from).normalize_or_zero().perpendicular_right() * self.config.path_clearance;
        (1..=samples).all(|i| {
            let point = from.lerp(to, i as f32 / samples as f32);
            !self.is_blocked_at(point)
                && !self.is_blocked_at(point + side)
                && !self.is_blocked_at(point - side)
        })
    }

    /// Blends `desired` with `current` and rescales to `target_speed`.
    ///
    /// A cold start (exactly zero current velocity) takes the desired
    /// velocity directly so the agent does not crawl out of rest.
    pub fn smooth_direction(&self, desired: Vec2, current: Vec2, target_speed: f32) -> Vec2 {
        if current.is_zero() {
            return desired.with_length(target_speed);
        }
        let factor = self.config.smoothing_factor.clamp(0.0, 0.99);
        let blended = desired * (1.0 - factor) + current * factor;
        let blended = if blended.length_squared() <= f32::EPSILON {
            desired
        } else {
            blended
        };
        blended.with_length(target_speed)
    }
}

fn compass() -> [Vec2; 8] {
    let d = core::f32::consts::FRAC_1_SQRT_2;
    [
        Vec2::new(1.0, 0.0),
        Vec2::new(d, d),
        Vec2::new(0.0, 1.0),
        Vec2::new(-d, d),
        Vec2::new(-1.0, 0.0),
        Vec2::new(-d, -d),
        Vec2::new(0.0, -1.0),
        Vec2::new(d, -d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Walls described by a closure over world points.
    struct FnGeometry<F: Fn(Vec2) -> bool + Send + Sync>(F);

    impl<F: Fn(Vec2) -> bool + Send + Sync> GeometryOracle for FnGeometry<F> {
        fn is_wall_at(&self, point: Vec2) -> bool {
            (self.0)(point)
        }

        fn generate_search_pattern(&self, origin: Vec2) -> Vec<Vec2> {
            vec![origin]
        }
    }

    fn open() -> FnGeometry<impl Fn(Vec2) -> bool + Send + Sync> {
        FnGeometry(|_| false)
    }

    #[test]
    fn obstacle_ahead_uses_lookahead_distance() {
        // Wall begins 40px east; lookahead is 1.5 * 32 = 48px.
        let geometry = FnGeometry(|p: Vec2| p.x >= 40.0);
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&geometry, &config);

        assert!(solver.has_obstacle_ahead(Vec2::ZERO, Vec2::new(2.0, 0.0), 2.0));
        assert!(!solver.has_obstacle_ahead(Vec2::ZERO, Vec2::new(-2.0, 0.0), 2.0));
        assert!(!solver.has_obstacle_ahead(Vec2::ZERO, Vec2::ZERO, 0.0));
    }

    #[test]
    fn blocked_forward_prefers_right_perpendicular() {
        // Only a wall block straight ahead (east); everything else is open.
        let geometry = FnGeometry(|p: Vec2| p.x > 30.0 && p.y.abs() < 15.0);
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&geometry, &config);

        let result =
            solver.find_alternative_direction(Vec2::ZERO, Vec2::new(1.0, 0.0), 2.0, &[], false);
        assert_eq!(result.kind, CandidateKind::PerpendicularRight);
        assert!((result.direction.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clear_forward_is_kept() {
        let geometry = open();
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&geometry, &config);

        let result =
            solver.find_alternative_direction(Vec2::ZERO, Vec2::new(0.0, 3.0), 3.0, &[], false);
        assert_eq!(result.kind, CandidateKind::Forward);
    }

    #[test]
    fn flip_flop_penalty_skips_recent_axis() {
        // Forward blocked; agent has been bouncing along the north/south axis.
        let geometry = FnGeometry(|p: Vec2| p.x > 30.0 && p.y.abs() < 15.0);
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&geometry, &config);
        let recent = [core::f32::consts::FRAC_PI_2, -core::f32::consts::FRAC_PI_2];

        let result =
            solver.find_alternative_direction(Vec2::ZERO, Vec2::new(1.0, 0.0), 2.0, &recent, true);
        assert_eq!(result.kind, CandidateKind::DiagonalRight);
    }

    #[test]
    fn fully_enclosed_agent_gets_exhausted_reverse() {
        let geometry = FnGeometry(|p: Vec2| p.length() > 10.0);
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&geometry, &config);

        let result =
            solver.find_alternative_direction(Vec2::ZERO, Vec2::new(1.0, 0.0), 2.0, &[], false);
        assert_eq!(result.kind, CandidateKind::Exhausted);
        assert_eq!(result.direction, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn clearance_force_points_away_from_wall() {
        let geometry = FnGeometry(|p: Vec2| p.x >= 15.0);
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&geometry, &config);

        let force = solver.wall_clearance_force(Vec2::ZERO);
        assert!(force.x < 0.0);
        assert!(force.y.abs() < 1e-5);
        assert!(force.length() <= 1.0 + 1e-5);
    }

    #[test]
    fn corridor_classification() {
        let corridor = FnGeometry(|p: Vec2| p.y.abs() > 20.0);
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&corridor, &config);
        assert!(solver.is_narrow_corridor(Vec2::ZERO));
        assert_eq!(solver.clearance_multiplier(Vec2::ZERO), config.narrow_clearance_multiplier);

        let geometry = open();
        let solver = MovementSolver::new(&geometry, &config);
        assert!(!solver.is_narrow_corridor(Vec2::ZERO));
    }

    #[test]
    fn smoothing_skips_blend_from_rest() {
        let geometry = open();
        let config = MovementConfig::default();
        let solver = MovementSolver::new(&geometry, &config);

        let from_rest = solver.smooth_direction(Vec2::new(0.0, 1.0), Vec2::ZERO, 2.0);
        assert_eq!(from_rest, Vec2::new(0.0, 2.0));

        let blended = solver.smooth_direction(Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0), 2.0);
        assert!((blended.length() - 2.0).abs() < 1e-5);
        assert!(blended.x > 0.0 && blended.y > blended.x);
    }
}
