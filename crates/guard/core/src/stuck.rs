//! Stuck, oscillation and flip-flop detection with recovery suggestions.
//!
//! One [`StuckDetector`] belongs to one guard. It keeps three bounded
//! histories:
//!
//! - per-frame displacement (stuck: the window is full and barely moved)
//! - raw positions (oscillating: the window is full and tightly clustered)
//! - significant heading changes (flip-flopping: consecutive near-π reversals)
//!
//! Doorway-stuck is tracked by a separate timer that only runs while the
//! caller reports the guard is near a doorway. Each new stuck episode is
//! recorded as a hotspot; hotspots survive [`StuckDetector::reset`] and fade
//! out by priority decay once they stop recurring.

use std::collections::VecDeque;

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::config::{FlipFlopMode, StuckConfig};
use crate::geometry::{Timestamp, Vec2, angle_delta};

const MAX_HOTSPOTS: usize = StuckConfig::MAX_HOTSPOTS;
/// Attempts past this no longer change the capped backup distance.
const MAX_BACKUP_EXPONENT: u32 = 16;

bitflags! {
    /// Conditions raised by the most recent [`StuckDetector::update`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct StuckFlags: u8 {
        const STUCK = 1 << 0;
        const OSCILLATING = 1 << 1;
        const FLIP_FLOPPING = 1 << 2;
        const DOORWAY_STUCK = 1 << 3;
    }
}

impl StuckFlags {
    /// Any condition that warrants recovery steering.
    pub fn needs_recovery(self) -> bool {
        !self.is_empty()
    }
}

/// Per-frame context supplied by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StuckContext {
    pub near_doorway: bool,
    /// Milliseconds since the previous update.
    pub dt_ms: f32,
}

/// Outcome of one detector update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StuckReport {
    pub flags: StuckFlags,
    /// The guard just became stuck this frame.
    pub new_episode: bool,
    /// Consecutive frames the stuck flag has been held.
    pub stuck_frames: u32,
    /// Distance to the nearest hotspot, if any exist.
    pub nearest_hotspot: Option<f32>,
}

/// Location where the guard has repeatedly become stuck.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hotspot {
    pub position: Vec2,
    pub occurrences: u32,
    pub priority: f32,
    pub last_hit: Timestamp,
}

/// Which recovery rule produced a suggestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Sidestep across a doorway the guard cannot get through.
    DoorwayPerpendicular,
    /// A heading not used recently.
    NovelHeading,
    /// No novel heading available; turn around completely.
    ForcedReversal,
    /// Steer away from a known hotspot.
    AvoidHotspot,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoverySuggestion {
    /// Unit direction.
    pub direction: Vec2,
    pub strategy: RecoveryStrategy,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct DirectionSample {
    angle: f32,
    at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct TemporaryWaypoint {
    point: Vec2,
    expires_at: Timestamp,
}

/// Rolling-window stuck detector for a single guard.
#[derive(Clone, Debug)]
pub struct StuckDetector {
    config: StuckConfig,
    displacements: VecDeque<f32>,
    positions: VecDeque<Vec2>,
    directions: VecDeque<DirectionSample>,
    last_position: Option<Vec2>,
    flags: StuckFlags,
    stuck_frames: u32,
    doorway_timer_ms: f32,
    recovery_attempts: u32,
    hotspots: ArrayVec<Hotspot, MAX_HOTSPOTS>,
    temporary_waypoint: Option<TemporaryWaypoint>,
    last_strategy_at: Option<Timestamp>,
}

impl StuckDetector {
    pub fn new(config: StuckConfig) -> Self {
        Self {
            displacements: VecDeque::with_capacity(config.displacement_window),
            positions: VecDeque::with_capacity(config.position_window),
            directions: VecDeque::with_capacity(config.direction_window),
            config,
            last_position: None,
            flags: StuckFlags::empty(),
            stuck_frames: 0,
            doorway_timer_ms: 0.0,
            recovery_attempts: 0,
            hotspots: ArrayVec::new(),
            temporary_waypoint: None,
            last_strategy_at: None,
        }
    }

    pub fn config(&self) -> &StuckConfig {
        &self.config
    }

    /// Feeds the current position and recomputes every flag.
    pub fn update(&mut self, position: Vec2, now: Timestamp, ctx: StuckContext) -> StuckReport {
        let displacement = self
            .last_position
            .map(|last| last.distance(position))
            .unwrap_or(0.0);
        self.last_position = Some(position);

        push_bounded(&mut self.displacements, displacement, self.config.displacement_window);
        push_bounded(&mut self.positions, position, self.config.position_window);

        let was_stuck = self.flags.contains(StuckFlags::STUCK);
        let mut flags = StuckFlags::empty();

        if self.window_is_stuck() {
            flags |= StuckFlags::STUCK;
        }
        if self.window_is_oscillating() {
            flags |= StuckFlags::OSCILLATING;
        }
        if self.detect_flip_flop(now) {
            flags |= StuckFlags::FLIP_FLOPPING;
        }
        if self.advance_doorway_timer(displacement, ctx) {
            flags |= StuckFlags::DOORWAY_STUCK;
        }

        let new_episode = flags.contains(StuckFlags::STUCK) && !was_stuck;
        if new_episode {
            self.record_hotspot(position, now);
            tracing::debug!(?position, hotspots = self.hotspots.len(), "stuck episode started");
        }

        self.stuck_frames = if flags.contains(StuckFlags::STUCK) {
            self.stuck_frames.saturating_add(1)
        } else {
            0
        };
        self.flags = flags;

        self.decay_hotspots(now, ctx.dt_ms);
        if self
            .temporary_waypoint
            .is_some_and(|waypoint| now >= waypoint.expires_at)
        {
            self.temporary_waypoint = None;
        }

        StuckReport {
            flags,
            new_episode,
            stuck_frames: self.stuck_frames,
            nearest_hotspot: self
                .nearest_hotspot(position)
                .map(|hotspot| hotspot.position.distance(position)),
        }
    }

    fn window_is_stuck(&self) -> bool {
        self.displacements.len() >= self.config.displacement_window
            && self.displacements.iter().sum::<f32>() < self.config.min_displacement
    }

    fn window_is_oscillating(&self) -> bool {
        self.positions.len() >= self.config.position_window
            && position_std_dev(&self.positions) < self.config.oscillation_threshold
    }

    fn advance_doorway_timer(&mut self, displacement: f32, ctx: StuckContext) -> bool {
        if !ctx.near_doorway {
            self.doorway_timer_ms = 0.0;
            return false;
        }
        if displacement < self.config.doorway_idle_displacement {
            self.doorway_timer_ms += ctx.dt_ms;
        } else {
            self.doorway_timer_ms =
                (self.doorway_timer_ms - ctx.dt_ms * self.config.doorway_decay_rate).max(0.0);
        }
        self.doorway_timer_ms >= self.config.doorway_min_ms
    }

    /// Appends a heading if it differs enough from the last recorded one.
    pub fn record_direction(&mut self, angle: f32, now: Timestamp) {
        if !angle.is_finite() {
            return;
        }
        if let Some(last) = self.directions.back()
            && angle_delta(angle, last.angle) < self.config.significant_turn
        {
            return;
        }
        push_bounded(
            &mut self.directions,
            DirectionSample { angle, at: now },
            self.config.direction_window,
        );
        if self.detect_flip_flop(now) {
            self.flags |= StuckFlags::FLIP_FLOPPING;
        } else {
            self.flags.remove(StuckFlags::FLIP_FLOPPING);
        }
    }

    /// True once the trailing run of near-π reversals reaches the mode's count.
    fn detect_flip_flop(&self, now: Timestamp) -> bool {
        let reversal = core::f32::consts::PI - self.config.reversal_tolerance;

        let (required, window_start) = match self.config.flip_flop {
            FlipFlopMode::Basic => (2, None),
            FlipFlopMode::Enhanced {
                min_reversals,
                window_ms,
            } => (
                min_reversals.max(1),
                Some(Timestamp(now.0.saturating_sub(window_ms))),
            ),
        };

        let mut run = 0;
        let newest_first = self.directions.iter().rev();
        for (newer, older) in newest_first.clone().zip(newest_first.skip(1)) {
            if window_start.is_some_and(|start| newer.at < start) {
                break;
            }
            if angle_delta(newer.angle, older.angle) >= reversal {
                run += 1;
                if run >= required {
                    return true;
                }
            } else {
                break;
            }
        }
        false
    }

    fn record_hotspot(&mut self, position: Vec2, now: Timestamp) {
        let radius_sq = self.config.hotspot_radius * self.config.hotspot_radius;
        if let Some(existing) = self
            .hotspots
            .iter_mut()
            .filter(|h| h.position.distance_squared(position) <= radius_sq)
            .min_by(|a, b| {
                a.position
                    .distance_squared(position)
                    .total_cmp(&b.position.distance_squared(position))
            })
        {
            existing.occurrences += 1;
            existing.priority += 1.0;
            existing.last_hit = now;
            return;
        }

        let hotspot = Hotspot {
            position,
            occurrences: 1,
            priority: 1.0,
            last_hit: now,
        };
        if self.hotspots.is_full()
            && let Some((lowest, _)) = self
                .hotspots
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.priority.total_cmp(&b.priority))
        {
            self.hotspots.remove(lowest);
        }
        self.hotspots.push(hotspot);
    }

    fn decay_hotspots(&mut self, now: Timestamp, dt_ms: f32) {
        if dt_ms <= 0.0 || self.config.hotspot_decay_ms <= 0.0 {
            return;
        }
        let idle_ms = self.config.hotspot_idle_ms;
        let decay = dt_ms / self.config.hotspot_decay_ms;
        for hotspot in self.hotspots.iter_mut() {
            if now.since(hotspot.last_hit) > idle_ms {
                hotspot.priority -= decay;
            }
        }
        self.hotspots.retain(|hotspot| hotspot.priority > 0.0);
    }

    fn nearest_hotspot(&self, position: Vec2) -> Option<&Hotspot> {
        self.hotspots.iter().min_by(|a, b| {
            a.position
                .distance_squared(position)
                .total_cmp(&b.position.distance_squared(position))
        })
    }

    /// Proposes a recovery heading, rate-limited by the strategy cooldown.
    ///
    /// Rules in priority order: doorway-stuck sidesteps perpendicular to the
    /// target; oscillating or flip-flopping picks a heading unlike the recent
    /// history (or reverses outright); otherwise steer away from a nearby
    /// hotspot.
    pub fn suggested_recovery_direction(
        &mut self,
        position: Vec2,
        target: Option<Vec2>,
        now: Timestamp,
    ) -> Option<RecoverySuggestion> {
        if self
            .last_strategy_at
            .is_some_and(|at| now.since(at) < self.config.strategy_cooldown_ms)
        {
            return None;
        }

        let to_target = target
            .map(|t| (t - position).normalize_or_zero())
            .filter(|d| !d.is_zero())
            .or_else(|| self.last_heading())
            .unwrap_or(Vec2::new(1.0, 0.0));

        let suggestion = if self.flags.contains(StuckFlags::DOORWAY_STUCK) {
            let direction = if self.recovery_attempts % 2 == 0 {
                to_target.perpendicular_right()
            } else {
                to_target.perpendicular_left()
            };
            Some(RecoverySuggestion {
                direction,
                strategy: RecoveryStrategy::DoorwayPerpendicular,
            })
        } else if self
            .flags
            .intersects(StuckFlags::OSCILLATING | StuckFlags::FLIP_FLOPPING)
        {
            Some(self.novel_heading(to_target))
        } else {
            self.nearest_hotspot(position)
                .filter(|h| h.position.distance(position) <= self.config.hotspot_avoid_radius)
                .map(|hotspot| {
                    let away = (position - hotspot.position).normalize_or_zero();
                    let direction = if away.is_zero() {
                        to_target.perpendicular_right()
                    } else {
                        away
                    };
                    RecoverySuggestion {
                        direction,
                        strategy: RecoveryStrategy::AvoidHotspot,
                    }
                })
        };

        if let Some(suggestion) = suggestion {
            self.last_strategy_at = Some(now);
            tracing::debug!(strategy = ?suggestion.strategy, "recovery suggested");
        }
        suggestion
    }

    fn novel_heading(&self, to_target: Vec2) -> RecoverySuggestion {
        let base = to_target.angle();
        let mut offsets: Vec<f32> = (0..8)
            .map(|i| i as f32 * core::f32::consts::FRAC_PI_4)
            .map(crate::geometry::wrap_angle)
            .collect();
        // Closest to the target first so recovery still makes progress.
        offsets.sort_by(|a, b| a.abs().total_cmp(&b.abs()));

        for offset in offsets {
            let angle = base + offset;
            let novel = self
                .directions
                .iter()
                .all(|sample| angle_delta(angle, sample.angle) >= self.config.novelty_threshold);
            if novel {
                return RecoverySuggestion {
                    direction: Vec2::from_angle(angle),
                    strategy: RecoveryStrategy::NovelHeading,
                };
            }
        }

        let reversed = self.last_heading().map(|h| -h).unwrap_or(-to_target);
        RecoverySuggestion {
            direction: reversed,
            strategy: RecoveryStrategy::ForcedReversal,
        }
    }

    fn last_heading(&self) -> Option<Vec2> {
        self.directions.back().map(|sample| Vec2::from_angle(sample.angle))
    }

    /// Point behind the guard relative to its target.
    ///
    /// The distance grows geometrically with each call until the next
    /// [`reset`](Self::reset), capped at the configured maximum.
    pub fn calculate_backup_position(&mut self, position: Vec2, target: Vec2) -> Vec2 {
        let away = (position - target).normalize_or_zero();
        let away = if away.is_zero() {
            self.last_heading().map(|h| -h).unwrap_or(Vec2::new(-1.0, 0.0))
        } else {
            away
        };
        let distance = (self.config.backup_base_distance
            * self
                .config
                .backup_growth
                .powi(self.recovery_attempts.min(MAX_BACKUP_EXPONENT) as i32))
        .min(self.config.backup_max_distance);
        self.recovery_attempts = self.recovery_attempts.saturating_add(1);
        position + away * distance
    }

    pub fn set_temporary_waypoint(&mut self, point: Vec2, now: Timestamp) {
        self.temporary_waypoint = Some(TemporaryWaypoint {
            point,
            expires_at: now + self.config.temporary_waypoint_ms,
        });
    }

    /// Active escape waypoint, if it has not expired.
    pub fn temporary_waypoint(&self, now: Timestamp) -> Option<Vec2> {
        self.temporary_waypoint
            .filter(|waypoint| now < waypoint.expires_at)
            .map(|waypoint| waypoint.point)
    }

    pub fn clear_temporary_waypoint(&mut self) {
        self.temporary_waypoint = None;
    }

    /// Clears all histories and flags. Hotspots are kept.
    pub fn reset(&mut self) {
        self.displacements.clear();
        self.positions.clear();
        self.directions.clear();
        self.last_position = None;
        self.flags = StuckFlags::empty();
        self.stuck_frames = 0;
        self.doorway_timer_ms = 0.0;
        self.recovery_attempts = 0;
        self.temporary_waypoint = None;
    }

    pub fn flags(&self) -> StuckFlags {
        self.flags
    }

    pub fn is_stuck(&self) -> bool {
        self.flags.contains(StuckFlags::STUCK)
    }

    pub fn is_oscillating(&self) -> bool {
        self.flags.contains(StuckFlags::OSCILLATING)
    }

    pub fn is_flip_flopping(&self) -> bool {
        self.flags.contains(StuckFlags::FLIP_FLOPPING)
    }

    pub fn is_doorway_stuck(&self) -> bool {
        self.flags.contains(StuckFlags::DOORWAY_STUCK)
    }

    pub fn stuck_frames(&self) -> u32 {
        self.stuck_frames
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    pub fn hotspots(&self) -> &[Hotspot] {
        &self.hotspots
    }

    /// Recorded headings, oldest first.
    pub fn recent_direction_angles(&self) -> Vec<f32> {
        self.directions.iter().map(|sample| sample.angle).collect()
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, value: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while window.len() >= capacity {
        window.pop_front();
    }
    window.push_back(value);
}

/// Population standard deviation of positions around their centroid.
fn position_std_dev(positions: &VecDeque<Vec2>) -> f32 {
    if positions.is_empty() {
        return 0.0;
    }
    let n = positions.len() as f32;
    let centroid = positions.iter().fold(Vec2::ZERO, |acc, p| acc + *p) * (1.0 / n);
    let variance = positions
        .iter()
        .map(|p| p.distance_squared(centroid))
        .sum::<f32>()
        / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use core::f32::consts::PI;

    use super::*;

    const FRAME: f32 = 16.0;

    fn ctx() -> StuckContext {
        StuckContext {
            near_doorway: false,
            dt_ms: FRAME,
        }
    }

    fn detector() -> StuckDetector {
        StuckDetector::new(StuckConfig::default())
    }

    #[test]
    fn stuck_exactly_when_window_fills() {
        let mut detector = detector();
        let window = detector.config().displacement_window;
        let mut position = Vec2::new(100.0, 100.0);

        for frame in 0..window {
            position.x += 0.1;
            let report = detector.update(position, Timestamp(frame as u64 * 16), ctx());
            if frame + 1 < window {
                assert!(!report.flags.contains(StuckFlags::STUCK), "frame {frame}");
            } else {
                assert!(report.flags.contains(StuckFlags::STUCK));
                assert!(report.new_episode);
            }
        }

        detector.reset();
        assert!(!detector.is_stuck());
        assert_eq!(detector.hotspots().len(), 1);
    }

    #[test]
    fn moving_guard_is_not_stuck() {
        let mut detector = detector();
        for frame in 0..60 {
            let position = Vec2::new(frame as f32 * 2.0, 0.0);
            let report = detector.update(position, Timestamp(frame * 16), ctx());
            assert!(!report.flags.contains(StuckFlags::STUCK));
            assert!(!report.flags.contains(StuckFlags::OSCILLATING));
        }
    }

    #[test]
    fn jitter_in_place_oscillates() {
        let mut detector = detector();
        let mut report = None;
        for frame in 0..30u64 {
            let x = if frame % 2 == 0 { 0.0 } else { 4.0 };
            report = Some(detector.update(Vec2::new(x, 0.0), Timestamp(frame * 16), ctx()));
        }
        let report = report.unwrap();
        assert!(report.flags.contains(StuckFlags::OSCILLATING));
        // Moving 4px per frame is not "stuck" by displacement.
        assert!(!report.flags.contains(StuckFlags::STUCK));
    }

    #[test]
    fn alternating_reversals_flip_flop() {
        let mut detector = detector();
        detector.record_direction(0.0, Timestamp(0));
        detector.record_direction(PI, Timestamp(200));
        assert!(!detector.is_flip_flopping());
        detector.record_direction(0.02, Timestamp(400));
        assert!(detector.is_flip_flopping());
    }

    #[test]
    fn monotonic_rotation_does_not_flip_flop() {
        let mut detector = detector();
        for i in 0..10 {
            detector.record_direction(i as f32 * 0.6, Timestamp(i * 100));
            assert!(!detector.is_flip_flopping());
        }
    }

    #[test]
    fn trailing_reversals_count_after_long_history() {
        let mut detector = detector();
        let window = detector.config().direction_window as u64;
        for i in 0..window {
            detector.record_direction(i as f32 * 0.6, Timestamp(i * 50));
        }
        assert!(!detector.is_flip_flopping());

        let now = window * 50;
        let last = (window - 1) as f32 * 0.6;
        detector.record_direction(last + PI, Timestamp(now));
        detector.record_direction(last, Timestamp(now + 50));
        assert!(detector.is_flip_flopping());
    }

    #[test]
    fn reversals_outside_window_are_ignored() {
        let mut detector = detector();
        detector.record_direction(0.0, Timestamp(0));
        detector.record_direction(PI, Timestamp(100));
        detector.record_direction(0.0, Timestamp(5_000));
        assert!(!detector.is_flip_flopping());
    }

    #[test]
    fn basic_mode_ignores_time() {
        let config = StuckConfig {
            flip_flop: FlipFlopMode::Basic,
            ..StuckConfig::default()
        };
        let mut detector = StuckDetector::new(config);
        detector.record_direction(0.0, Timestamp(0));
        detector.record_direction(PI, Timestamp(10_000));
        detector.record_direction(0.0, Timestamp(20_000));
        assert!(detector.is_flip_flopping());
    }

    #[test]
    fn doorway_timer_accumulates_and_decays() {
        let mut detector = detector();
        let doorway = StuckContext {
            near_doorway: true,
            dt_ms: 100.0,
        };
        let position = Vec2::new(10.0, 10.0);
        for frame in 0..4 {
            let report = detector.update(position, Timestamp(frame * 100), doorway);
            assert!(!report.flags.contains(StuckFlags::DOORWAY_STUCK));
        }
        let report = detector.update(position, Timestamp(400), doorway);
        assert!(report.flags.contains(StuckFlags::DOORWAY_STUCK));
        assert!(!report.flags.contains(StuckFlags::STUCK));

        // Leaving the doorway resets the timer.
        let report = detector.update(Vec2::new(60.0, 10.0), Timestamp(600), ctx());
        assert!(!report.flags.contains(StuckFlags::DOORWAY_STUCK));
    }

    #[test]
    fn hotspots_merge_and_decay() {
        let config = StuckConfig {
            displacement_window: 3,
            position_window: 3,
            hotspot_idle_ms: 1_000,
            hotspot_decay_ms: 1_000.0,
            ..StuckConfig::default()
        };
        let mut detector = StuckDetector::new(config);
        let here = Vec2::new(50.0, 50.0);

        for frame in 0..3 {
            detector.update(here, Timestamp(frame * 16), ctx());
        }
        assert_eq!(detector.hotspots().len(), 1);

        detector.reset();
        for frame in 0..3 {
            detector.update(here + Vec2::new(5.0, 0.0), Timestamp(100 + frame * 16), ctx());
        }
        assert_eq!(detector.hotspots().len(), 1);
        assert_eq!(detector.hotspots()[0].occurrences, 2);
        assert!((detector.hotspots()[0].priority - 2.0).abs() < 1e-6);

        // Idle long enough, then decay 2 units of priority.
        detector.reset();
        let mut now = 2_000;
        for _ in 0..3 {
            detector.update(
                Vec2::new(500.0, 500.0),
                Timestamp(now),
                StuckContext {
                    near_doorway: false,
                    dt_ms: 1_000.0,
                },
            );
            now += 1_000;
        }
        assert!(
            detector
                .hotspots()
                .iter()
                .all(|h| h.position.distance(here) > 48.0)
        );
    }

    #[test]
    fn hotspot_capacity_evicts_lowest_priority() {
        let config = StuckConfig {
            displacement_window: 2,
            position_window: 2,
            ..StuckConfig::default()
        };
        let mut detector = StuckDetector::new(config);
        let mut now = 0;
        for i in 0..(MAX_HOTSPOTS + 2) {
            detector.reset();
            let p = Vec2::new(i as f32 * 200.0, 0.0);
            for _ in 0..2 {
                detector.update(p, Timestamp(now), ctx());
                now += 16;
            }
        }
        assert_eq!(detector.hotspots().len(), MAX_HOTSPOTS);
    }

    #[test]
    fn backup_distance_grows_and_caps() {
        let mut detector = detector();
        let position = Vec2::new(0.0, 0.0);
        let target = Vec2::new(100.0, 0.0);

        let first = detector.calculate_backup_position(position, target);
        assert!((first.x + 24.0).abs() < 1e-4);
        let second = detector.calculate_backup_position(position, target);
        assert!((second.x + 36.0).abs() < 1e-4);
        for _ in 0..10 {
            detector.calculate_backup_position(position, target);
        }
        let capped = detector.calculate_backup_position(position, target);
        assert!((capped.x + 96.0).abs() < 1e-4);

        detector.reset();
        assert_eq!(detector.recovery_attempts(), 0);
    }

    #[test]
    fn backup_distance_stays_capped_after_many_attempts() {
        let mut detector = detector();
        detector.recovery_attempts = u32::MAX;
        let backup = detector.calculate_backup_position(Vec2::ZERO, Vec2::new(100.0, 0.0));
        assert!((backup.x + 96.0).abs() < 1e-4);
        assert_eq!(detector.recovery_attempts(), u32::MAX);
    }

    #[test]
    fn recovery_prefers_doorway_then_rate_limits() {
        let mut detector = detector();
        let doorway = StuckContext {
            near_doorway: true,
            dt_ms: 600.0,
        };
        let position = Vec2::new(0.0, 0.0);
        detector.update(position, Timestamp(0), doorway);
        assert!(detector.is_doorway_stuck());

        let suggestion = detector
            .suggested_recovery_direction(position, Some(Vec2::new(100.0, 0.0)), Timestamp(0))
            .unwrap();
        assert_eq!(suggestion.strategy, RecoveryStrategy::DoorwayPerpendicular);
        assert_eq!(suggestion.direction, Vec2::new(0.0, 1.0));

        assert!(
            detector
                .suggested_recovery_direction(position, None, Timestamp(100))
                .is_none()
        );
    }

    #[test]
    fn flip_flop_recovery_picks_novel_heading() {
        let mut detector = detector();
        detector.record_direction(0.0, Timestamp(0));
        detector.record_direction(PI, Timestamp(100));
        detector.record_direction(0.0, Timestamp(200));
        assert!(detector.is_flip_flopping());

        let suggestion = detector
            .suggested_recovery_direction(Vec2::ZERO, Some(Vec2::new(100.0, 0.0)), Timestamp(300))
            .unwrap();
        assert_eq!(suggestion.strategy, RecoveryStrategy::NovelHeading);
        let angle = suggestion.direction.angle();
        assert!(angle_delta(angle, 0.0) >= core::f32::consts::FRAC_PI_3 - 1e-4);
        assert!(angle_delta(angle, PI) >= core::f32::consts::FRAC_PI_3 - 1e-4);
    }

    #[test]
    fn temporary_waypoint_expires() {
        let mut detector = detector();
        detector.set_temporary_waypoint(Vec2::new(5.0, 5.0), Timestamp(1_000));
        assert_eq!(detector.temporary_waypoint(Timestamp(2_999)), Some(Vec2::new(5.0, 5.0)));
        assert_eq!(detector.temporary_waypoint(Timestamp(3_000)), None);
    }
}
