//! Run a scenario through the guard rollout pipeline

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use runtime::{
    EngineSelector, FallbackManager, FileAggregateRepository, HealthStatus, MetricsConfig,
    MetricsLogger, RolloutConfig,
};

use super::OutputFormat;
use crate::dirs;
use crate::scenario::Scenario;
use crate::simulation::{RunOutcome, Simulation};

/// Run a scenario and record its rollout session
#[derive(Parser)]
pub struct Run {
    /// Scenario file (RON)
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,

    /// Frames to simulate (defaults to the scenario's own count)
    #[arg(short, long, value_name = "N")]
    frames: Option<u64>,

    /// Custom data directory for rollout aggregates
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Controller selection; `auto` follows the GUARD_AI_* environment
    #[arg(short, long, value_enum, default_value = "auto")]
    engine: EngineChoice,

    /// Keep aggregates in memory only
    #[arg(long)]
    no_persist: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum EngineChoice {
    /// Rollout switches decide per level
    Auto,
    /// Force the orchestrated controller everywhere
    Orchestrator,
    /// Force the legacy controller everywhere
    Legacy,
}

impl Run {
    pub fn execute(self) -> Result<()> {
        let scenario = Scenario::load(&self.scenario)?;

        let mut rollout = RolloutConfig::from_env();
        match self.engine {
            EngineChoice::Auto => {}
            EngineChoice::Orchestrator => rollout.force_enable(),
            EngineChoice::Legacy => rollout.force_disable(),
        }

        let mut logger = MetricsLogger::new(MetricsConfig::default(), rollout.thresholds);
        if !self.no_persist {
            let dir = self.data_dir.unwrap_or_else(dirs::data_dir);
            let repository = FileAggregateRepository::in_dir(&dir)
                .with_context(|| format!("Failed to open data directory: {}", dir.display()))?;
            tracing::info!("Rollout aggregates: {}", repository.path().display());
            logger = logger.with_repository(Arc::new(repository));
        }

        let frames = self.frames.unwrap_or(u64::from(scenario.frames));
        let selector = EngineSelector::new(rollout, FallbackManager::default());
        let mut simulation = Simulation::new(&scenario, selector, Arc::new(Mutex::new(logger)))?;
        simulation.run(frames)?;
        let outcome = simulation.finish(chrono::Local::now().date_naive())?;

        match self.format {
            OutputFormat::Summary => print_summary(&outcome),
            OutputFormat::Json => print_json(&outcome)?,
        }
        Ok(())
    }
}

fn print_summary(outcome: &RunOutcome) {
    let summary = &outcome.summary;
    let health = match summary.health {
        HealthStatus::Healthy => style(summary.health.to_string()).green(),
        HealthStatus::Degraded => style(summary.health.to_string()).yellow(),
        HealthStatus::Unhealthy => style(summary.health.to_string()).red().bold(),
    };

    println!("{}", style(format!("=== {} ===", outcome.scenario)).bold().cyan());
    println!(
        "Level {}  {} frames  {:.1}s simulated",
        summary.level,
        outcome.stats.frames,
        summary.duration_ms as f64 / 1_000.0
    );
    println!("Health: {health}");
    println!();

    println!("{}", style("Controllers").bold());
    println!("  Orchestrated frames: {}", outcome.stats.orchestrated_frames);
    println!("  Legacy frames:       {}", outcome.stats.legacy_frames);
    println!("  Fallback trips:      {}", outcome.stats.fallbacks);
    println!();

    println!("{}", style("Behavior").bold());
    println!("  Detections:          {}", outcome.stats.detections);
    println!("  State transitions:   {}", summary.counters.state_transitions);
    println!("  Stuck episodes:      {}", outcome.stuck_episodes);
    println!("  Backups:             {}", outcome.stats.backups);
    println!("  Doorway conflicts:   {}", outcome.doorway_conflicts);
    println!("  Average speed:       {:.1}", summary.average_speed);
    println!();

    println!("{}", style("Rates").bold());
    println!("  Stuck:    {:.3}", summary.rates.stuck);
    println!("  Fallback: {:.3}", summary.rates.fallback);
    println!("  Anomaly:  {:.3}", summary.rates.anomaly);

    if let Some(rollback) = &summary.rollback {
        println!();
        println!(
            "{} {} {:.3} > {:.3} after {} samples",
            style("Rollback recommended:").red().bold(),
            rollback.reason,
            rollback.rate,
            rollback.threshold,
            rollback.samples
        );
        if outcome.rolled_back {
            println!("  Level {} removed from the canary list", summary.level);
        }
    }

    println!();
    println!("{}", style("Guards").bold());
    for guard in &outcome.guards {
        println!(
            "  {}  {:<16} {:<12} ({:.0}, {:.0})",
            guard.agent,
            guard.state.to_string(),
            guard.engine.to_string(),
            guard.position.x,
            guard.position.y
        );
    }
}

fn print_json(outcome: &RunOutcome) -> Result<()> {
    let summary = &outcome.summary;
    let guards: Vec<_> = outcome
        .guards
        .iter()
        .map(|guard| {
            serde_json::json!({
                "agent": guard.agent.0,
                "state": guard.state,
                "engine": guard.engine.to_string(),
                "position": [guard.position.x, guard.position.y],
            })
        })
        .collect();

    let value = serde_json::json!({
        "scenario": outcome.scenario,
        "level": summary.level,
        "duration_ms": summary.duration_ms,
        "health": summary.health,
        "counters": summary.counters,
        "rates": {
            "stuck": summary.rates.stuck,
            "fallback": summary.rates.fallback,
            "anomaly": summary.rates.anomaly,
        },
        "average_speed": summary.average_speed,
        "rollback": summary.rollback,
        "rolled_back": outcome.rolled_back,
        "stats": {
            "frames": outcome.stats.frames,
            "orchestrated_frames": outcome.stats.orchestrated_frames,
            "legacy_frames": outcome.stats.legacy_frames,
            "detections": outcome.stats.detections,
            "backups": outcome.stats.backups,
            "fallbacks": outcome.stats.fallbacks,
        },
        "stuck_episodes": outcome.stuck_episodes,
        "doorway_conflicts": outcome.doorway_conflicts,
        "guards": guards,
    });

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::AggregateRepository;

    const CORRIDOR: &str = r#########"(
        name: "corridor",
        level: 4,
        map: [
            "########",
            "#......#",
            "########",
        ],
        guards: [
            (start: (1, 1), patrol: [(1, 1), (3, 1)]),
            (start: (6, 1), patrol: [(6, 1), (4, 1)]),
        ],
        player: (path: [(3, 1)], speed: 0.0),
    )"#########;

    #[test]
    fn run_persists_session_aggregate() {
        let dir = tempfile::TempDir::new().unwrap();
        let scenario = dir.path().join("corridor.ron");
        std::fs::write(&scenario, CORRIDOR).unwrap();
        let data_dir = dir.path().join("data");

        Run {
            scenario,
            frames: Some(30),
            data_dir: Some(data_dir.clone()),
            engine: EngineChoice::Orchestrator,
            no_persist: false,
            format: OutputFormat::Json,
        }
        .execute()
        .unwrap();

        let document = FileAggregateRepository::in_dir(&data_dir)
            .unwrap()
            .load()
            .unwrap();
        let (_, levels) = document.days().next().unwrap();
        let aggregate = &levels[&runtime::level_key(4)];
        assert_eq!(aggregate.sessions, 1);
        assert_eq!(aggregate.samples, 60);
    }

    #[test]
    fn no_persist_leaves_data_dir_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let scenario = dir.path().join("corridor.ron");
        std::fs::write(&scenario, CORRIDOR).unwrap();
        let data_dir = dir.path().join("data");

        Run {
            scenario,
            frames: Some(10),
            data_dir: Some(data_dir.clone()),
            engine: EngineChoice::Legacy,
            no_persist: true,
            format: OutputFormat::Summary,
        }
        .execute()
        .unwrap();

        assert!(!data_dir.exists());
    }
}
