//! Rollout monitoring end to end: sessions, rollback advice, persistence.

use std::sync::Arc;

use chrono::NaiveDate;
use guard_core::{BehaviorState, Timestamp};
use runtime::{
    AggregateRepository, EnginePath, EngineSelector, FallbackManager, FileAggregateRepository,
    HealthStatus, MetricSample, MetricsConfig, MetricsLogger, RollbackReason, RollbackThresholds,
    RolloutConfig,
};
use tempfile::TempDir;

fn sample(at: u64, stuck: bool) -> MetricSample {
    MetricSample {
        at: Timestamp(at),
        state: BehaviorState::Patrol,
        speed: 40.0,
        stuck,
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

#[test]
fn stuck_rate_above_threshold_recommends_rollback() {
    let mut logger = MetricsLogger::new(
        MetricsConfig::default(),
        RollbackThresholds {
            min_samples: 30,
            stuck_rate: 0.10,
            ..RollbackThresholds::default()
        },
    );
    logger.start_session(5, Timestamp(0));
    for i in 0..40u64 {
        logger.record_sample(5, sample(i * 16, i >= 35));
    }

    let recommendation = logger.rollback_recommendation(5).unwrap();
    assert_eq!(recommendation.reason, RollbackReason::StuckRate);
    assert!(recommendation.rate > 0.10);
    assert!(recommendation.samples >= 30);
    assert_eq!(logger.health(5), Some(HealthStatus::Unhealthy));

    let rates = logger.session(5).unwrap().rates();
    assert!((rates.stuck - 5.0 / 40.0).abs() < 1e-9);
}

#[test]
fn rollback_removes_level_from_canary_rollout() {
    let mut logger = MetricsLogger::default();
    let mut selector =
        EngineSelector::new(RolloutConfig::with_canary_levels([5]), FallbackManager::default());
    assert_eq!(selector.select(5, Timestamp(0)), EnginePath::Orchestrator);

    logger.start_session(5, Timestamp(0));
    for i in 0..40u64 {
        logger.record_sample(5, sample(i * 16, i % 2 == 0));
    }
    let recommendation = logger.rollback_recommendation(5).unwrap();
    selector.roll_back(5, &recommendation);
    assert_eq!(selector.select(5, Timestamp(1_000)), EnginePath::Legacy);
}

#[test]
fn aggregates_survive_reload() {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(FileAggregateRepository::in_dir(dir.path()).unwrap());

    let mut logger = MetricsLogger::default().with_repository(repository.clone());
    for (run, stuck_every) in [(0u64, 10u64), (1, 5)] {
        logger.start_session(2, Timestamp(run * 100_000));
        for i in 0..100u64 {
            logger.record_sample(2, sample(run * 100_000 + i * 16, i % stuck_every == 0));
        }
        logger.end_session(2, date()).unwrap();
    }

    let reloaded = MetricsLogger::default().with_repository(repository.clone());
    let level = reloaded.aggregates().level(date(), 2).unwrap();
    assert_eq!(level.sessions, 2);
    assert_eq!(level.samples, 200);
    assert!((level.avg_stuck_rate - 0.15).abs() < 1e-9);
    assert!((level.avg_velocity - 40.0).abs() < 1e-9);

    let on_disk = repository.load().unwrap();
    assert_eq!(&on_disk, reloaded.aggregates());
}
