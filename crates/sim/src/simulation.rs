//! Deterministic frame loop over a scenario.
//!
//! The simulation plays the host: it integrates guard movement against the
//! tile map, senses the scripted player, feeds awareness to each guard and
//! samples every frame into the level's rollout session.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use guard_core::{
    AgentId, AwarenessConfig, AwarenessMeter, BehaviorState, GeometryOracle, StuckFlags,
    Timestamp, Vec2,
};
use runtime::{
    Coordinator, CoordinatorConfig, Diagnostics, EnginePath, EngineSelector, FanoutDiagnostics,
    FrameInput, FrameOutput, GuardBrain, GuardEvent, GuardOrchestrator, GuardSetup, LegacyConfig,
    LegacyController, MetricSample, MetricsDiagnostics, MetricsLogger, OrchestratorConfig,
    RecordingDiagnostics, SessionSummary, TracingDiagnostics,
};

use crate::map::TileMap;
use crate::scenario::Scenario;

/// Frame counters gathered alongside the rollout session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub orchestrated_frames: u64,
    pub legacy_frames: u64,
    pub detections: u64,
    pub backups: u64,
    pub fallbacks: u64,
}

#[derive(Clone, Debug)]
pub struct GuardStatus {
    pub agent: AgentId,
    pub state: BehaviorState,
    pub engine: EnginePath,
    pub position: Vec2,
}

#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub scenario: String,
    pub summary: SessionSummary,
    pub stats: RunStats,
    pub guards: Vec<GuardStatus>,
    pub stuck_episodes: usize,
    pub doorway_conflicts: usize,
    /// The level was taken off the canary list because of this run.
    pub rolled_back: bool,
}

struct SimGuard {
    brain: GuardBrain,
    awareness: AwarenessMeter,
    position: Vec2,
    velocity: Vec2,
    base_speed: f32,
    last_state: BehaviorState,
}

impl SimGuard {
    /// Applies one frame of steering; walls stop movement per axis.
    fn integrate(&mut self, out: &FrameOutput, map: &TileMap, dt_s: f32) -> bool {
        if out.skipped {
            self.velocity = Vec2::ZERO;
            return false;
        }
        if let Some(backup) = out.backup_position
            && !map.is_wall_at(backup)
        {
            self.position = backup;
            self.velocity = Vec2::ZERO;
            return true;
        }

        let step = out.velocity * dt_s;
        let candidates = [
            self.position + step,
            self.position + Vec2::new(step.x, 0.0),
            self.position + Vec2::new(0.0, step.y),
        ];
        if let Some(next) = candidates.into_iter().find(|p| !map.is_wall_at(*p)) {
            self.position = next;
        }
        self.velocity = out.velocity;
        false
    }
}

struct Player {
    path: Vec<Vec2>,
    index: usize,
    position: Vec2,
    velocity: Vec2,
    speed: f32,
}

impl Player {
    fn advance(&mut self, dt_s: f32) {
        let start = self.position;
        let mut remaining = self.speed.max(0.0) * dt_s;
        for _ in 0..=self.path.len() {
            let target = self.path[self.index];
            let offset = target - self.position;
            let distance = offset.length();
            if distance > remaining {
                self.position += offset.with_length(remaining);
                break;
            }
            self.position = target;
            remaining -= distance;
            self.index = (self.index + 1) % self.path.len();
        }
        self.velocity = if dt_s > 0.0 {
            (self.position - start) * (1.0 / dt_s)
        } else {
            Vec2::ZERO
        };
    }
}

pub struct Simulation {
    name: String,
    level: u32,
    dt_ms: f32,
    frame: u64,
    map: Arc<TileMap>,
    awareness: AwarenessConfig,
    coordinator: Coordinator,
    selector: EngineSelector,
    logger: Arc<Mutex<MetricsLogger>>,
    recorder: Arc<RecordingDiagnostics>,
    guards: Vec<SimGuard>,
    player: Player,
    stats: RunStats,
}

impl Simulation {
    /// Builds the level and opens the rollout session at time zero.
    pub fn new(
        scenario: &Scenario,
        selector: EngineSelector,
        logger: Arc<Mutex<MetricsLogger>>,
    ) -> Result<Self> {
        let map = Arc::new(scenario.build_map()?);
        let geometry: Arc<dyn GeometryOracle> = map.clone();
        let recorder = Arc::new(RecordingDiagnostics::new());
        let diagnostics: Arc<dyn Diagnostics> = Arc::new(
            FanoutDiagnostics::default()
                .with(Arc::new(TracingDiagnostics))
                .with(Arc::new(MetricsDiagnostics::new(logger.clone(), scenario.level)))
                .with(recorder.clone()),
        );

        let difficulty = scenario.difficulty.profile();
        let awareness = AwarenessConfig::default();
        let guards = scenario
            .guards
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let id = AgentId(i as u32 + 1);
                let route: Vec<Vec2> = spec
                    .patrol
                    .iter()
                    .map(|&(x, y)| map.tile_center(x, y))
                    .collect();
                let orchestrator = GuardOrchestrator::new(
                    id,
                    GuardSetup {
                        patrol_route: route.clone(),
                        difficulty,
                    },
                    OrchestratorConfig::default(),
                    geometry.clone(),
                    diagnostics.clone(),
                );
                let legacy = LegacyController::new(id, route, LegacyConfig::default());
                SimGuard {
                    brain: GuardBrain::new(orchestrator, legacy, diagnostics.clone()),
                    awareness: AwarenessMeter::new(awareness.clone(), &difficulty),
                    position: map.tile_center(spec.start.0, spec.start.1),
                    velocity: Vec2::ZERO,
                    base_speed: spec.speed,
                    last_state: BehaviorState::Patrol,
                }
            })
            .collect();

        let path: Vec<Vec2> = scenario
            .player
            .path
            .iter()
            .map(|&(x, y)| map.tile_center(x, y))
            .collect();
        let player = Player {
            position: path[0],
            index: 0,
            path,
            velocity: Vec2::ZERO,
            speed: scenario.player.speed,
        };

        lock(&logger)?.start_session(scenario.level, Timestamp::ZERO);
        tracing::info!(
            scenario = %scenario.name,
            level = scenario.level,
            difficulty = %scenario.difficulty,
            guards = scenario.guards.len(),
            "simulation ready"
        );

        Ok(Self {
            name: scenario.name.clone(),
            level: scenario.level,
            dt_ms: scenario.dt_ms,
            frame: 0,
            coordinator: Coordinator::new(CoordinatorConfig::default(), geometry, diagnostics),
            map,
            awareness,
            selector,
            logger,
            recorder,
            guards,
            player,
            stats: RunStats::default(),
        })
    }

    pub fn now(&self) -> Timestamp {
        Timestamp((self.frame as f64 * f64::from(self.dt_ms)) as u64)
    }

    pub fn run(&mut self, frames: u64) -> Result<()> {
        for _ in 0..frames {
            self.step()?;
        }
        Ok(())
    }

    pub fn step(&mut self) -> Result<()> {
        let now = self.now();
        let dt_s = self.dt_ms / 1_000.0;
        self.player.advance(dt_s);

        for i in 0..self.guards.len() {
            let sighting = self.sighting(self.guards[i].position);
            let path = self.selector.select(self.level, now);

            let guard = &mut self.guards[i];
            let awareness = guard.awareness.observe(sighting, self.dt_ms);
            let input = FrameInput {
                position: guard.position,
                velocity: guard.velocity,
                awareness,
                player_visible: sighting.is_some(),
                player_position: sighting.map(|_| self.player.position),
                player_velocity: self.player.velocity,
                base_speed: guard.base_speed,
                now,
                dt_ms: self.dt_ms,
            };
            let out = guard
                .brain
                .update(path, &input, Some(&mut self.coordinator));

            match path {
                EnginePath::Orchestrator => {
                    self.stats.orchestrated_frames += 1;
                    if self.selector.observe(self.level, &out, now) {
                        self.stats.fallbacks += 1;
                        guard.brain.report_fallback(self.level, now);
                    }
                }
                EnginePath::Legacy => self.stats.legacy_frames += 1,
            }
            if out.state == BehaviorState::Chase && guard.last_state != BehaviorState::Chase {
                self.stats.detections += 1;
            }
            guard.last_state = out.state;
            if guard.integrate(&out, &self.map, dt_s) {
                self.stats.backups += 1;
            }

            lock(&self.logger)?.record_sample(
                self.level,
                MetricSample {
                    at: now,
                    state: out.state,
                    speed: out.speed(),
                    stuck: out.stuck_flags.contains(StuckFlags::STUCK),
                },
            );
        }

        self.selector.end_frame(self.level);
        self.coordinator.update(now);
        self.frame += 1;
        self.stats.frames += 1;
        Ok(())
    }

    /// Distance to the player when in range and line of sight.
    fn sighting(&self, from: Vec2) -> Option<f32> {
        let distance = from.distance(self.player.position);
        (distance <= self.awareness.sight_range
            && self.map.has_line_of_sight(from, self.player.position))
        .then_some(distance)
    }

    /// Ends the rollout session and applies any rollback it recommends.
    pub fn finish(mut self, date: NaiveDate) -> Result<RunOutcome> {
        let summary = lock(&self.logger)?
            .end_session(self.level, date)
            .context("rollout session was not open")?;

        let rolled_back = match &summary.rollback {
            Some(recommendation) => {
                let was_canary = self.selector.rollout().canary_levels.contains(&self.level);
                self.selector.roll_back(self.level, recommendation);
                was_canary
            }
            None => false,
        };

        let guards = self
            .guards
            .iter()
            .map(|guard| GuardStatus {
                agent: guard.brain.id(),
                state: guard.last_state,
                engine: guard.brain.active(),
                position: guard.position,
            })
            .collect();

        Ok(RunOutcome {
            scenario: self.name,
            summary,
            stats: self.stats,
            guards,
            stuck_episodes: self
                .recorder
                .count(|e| matches!(e, GuardEvent::StuckEpisode { .. })),
            doorway_conflicts: self
                .recorder
                .count(|e| matches!(e, GuardEvent::DoorwayConflict { .. })),
            rolled_back,
        })
    }

    pub fn selector(&self) -> &EngineSelector {
        &self.selector
    }
}

fn lock(logger: &Mutex<MetricsLogger>) -> Result<MutexGuard<'_, MetricsLogger>> {
    logger
        .lock()
        .map_err(|_| anyhow!("metrics logger lock poisoned"))
}
