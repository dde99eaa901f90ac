//! Rollout metrics: live per-level sessions and persisted daily aggregates.
//!
//! [`MetricsLogger`] watches each level's session for anomalies and decides
//! when the orchestrated behavior should be rolled back. Finished sessions are
//! folded into an [`AggregateDocument`] that is persisted through an
//! [`AggregateRepository`]; persistence is best effort and never fails the
//! caller.

mod aggregate;
mod session;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use guard_core::{BehaviorState, Timestamp};

pub use aggregate::{AggregateDocument, LevelAggregate, level_key};
pub use session::{
    Anomaly, AnomalyKind, HealthStatus, MetricSample, RollbackReason, RollbackRecommendation,
    RolloutSession, SessionCounters, SessionRates,
};

use crate::repository::AggregateRepository;
use crate::rollout::RollbackThresholds;

/// Anomaly detection windows and aggregate retention.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsConfig {
    /// Consecutive zero-speed samples that count as a stall.
    pub zero_velocity_frames: u32,
    pub zero_speed_epsilon: f32,
    /// Same transition this many times within `loop_window_ms` is a loop.
    pub loop_repeat_count: usize,
    pub loop_window_ms: u64,
    /// More than this many transitions within `burst_window_ms` is a burst.
    pub burst_max_transitions: usize,
    pub burst_window_ms: u64,
    pub fallback_burst_count: usize,
    pub fallback_burst_window_ms: u64,
    /// One anomaly per kind within this window.
    pub anomaly_dedupe_ms: u64,
    /// Samples kept per session for inspection; counters are unbounded.
    pub max_retained_samples: usize,
    pub retention_days: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            zero_velocity_frames: 30,
            zero_speed_epsilon: 0.01,
            loop_repeat_count: 3,
            loop_window_ms: 5_000,
            burst_max_transitions: 5,
            burst_window_ms: 1_000,
            fallback_burst_count: 3,
            fallback_burst_window_ms: 2_000,
            anomaly_dedupe_ms: 5_000,
            max_retained_samples: 4_096,
            retention_days: 30,
        }
    }
}

/// Final figures of an ended session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub level: u32,
    pub duration_ms: u64,
    pub counters: SessionCounters,
    pub rates: SessionRates,
    pub average_speed: f64,
    pub health: HealthStatus,
    pub rollback: Option<RollbackRecommendation>,
}

pub struct MetricsLogger {
    config: MetricsConfig,
    thresholds: RollbackThresholds,
    sessions: HashMap<u32, RolloutSession>,
    document: AggregateDocument,
    repository: Option<Arc<dyn AggregateRepository>>,
}

impl Default for MetricsLogger {
    fn default() -> Self {
        Self::new(MetricsConfig::default(), RollbackThresholds::default())
    }
}

impl MetricsLogger {
    pub fn new(config: MetricsConfig, thresholds: RollbackThresholds) -> Self {
        Self {
            config,
            thresholds,
            sessions: HashMap::new(),
            document: AggregateDocument::default(),
            repository: None,
        }
    }

    /// Attaches a repository and loads the aggregates it holds.
    ///
    /// A failed load is logged and starts from an empty document.
    pub fn with_repository(mut self, repository: Arc<dyn AggregateRepository>) -> Self {
        match repository.load() {
            Ok(document) => self.document = document,
            Err(error) => {
                tracing::warn!(%error, "failed to load rollout aggregates; starting empty")
            }
        }
        self.repository = Some(repository);
        self
    }

    /// Opens a session for `level`, discarding any unfinished one.
    pub fn start_session(&mut self, level: u32, now: Timestamp) {
        if self
            .sessions
            .insert(level, RolloutSession::new(level, now))
            .is_some()
        {
            tracing::warn!(level, "replacing unfinished rollout session");
        }
        tracing::info!(level, %now, "rollout session started");
    }

    pub fn record_sample(&mut self, level: u32, sample: MetricSample) {
        if let Some(session) = self.sessions.get_mut(&level) {
            session.record_sample(sample, &self.config, &self.thresholds);
        }
    }

    pub fn record_stuck_event(&mut self, level: u32, at: Timestamp) {
        if let Some(session) = self.sessions.get_mut(&level) {
            session.record_stuck_event(at, &self.thresholds);
        }
    }

    pub fn record_fallback_trigger(&mut self, level: u32, at: Timestamp) {
        if let Some(session) = self.sessions.get_mut(&level) {
            session.record_fallback_trigger(at, &self.config, &self.thresholds);
        }
    }

    pub fn record_state_transition(
        &mut self,
        level: u32,
        from: BehaviorState,
        to: BehaviorState,
        at: Timestamp,
    ) {
        if let Some(session) = self.sessions.get_mut(&level) {
            session.record_state_transition(from, to, at, &self.config, &self.thresholds);
        }
    }

    pub fn rollback_recommendation(&self, level: u32) -> Option<RollbackRecommendation> {
        self.sessions.get(&level)?.rollback()
    }

    pub fn health(&self, level: u32) -> Option<HealthStatus> {
        Some(self.sessions.get(&level)?.health(&self.thresholds))
    }

    pub fn session(&self, level: u32) -> Option<&RolloutSession> {
        self.sessions.get(&level)
    }

    /// Closes the session, folds it into `date`'s aggregate and persists.
    pub fn end_session(&mut self, level: u32, date: NaiveDate) -> Option<SessionSummary> {
        let session = self.sessions.remove(&level)?;
        let summary = SessionSummary {
            level,
            duration_ms: session.duration_ms(),
            counters: session.counters,
            rates: session.rates(),
            average_speed: session.average_speed(),
            health: session.health(&self.thresholds),
            rollback: session.rollback(),
        };

        self.document.fold(date, &summary);
        let evicted = self.document.retain_days(date, self.config.retention_days);
        if evicted > 0 {
            tracing::debug!(evicted, "evicted expired aggregate days");
        }
        self.persist();

        tracing::info!(
            level,
            samples = summary.counters.samples,
            stuck_rate = summary.rates.stuck,
            health = %summary.health,
            "rollout session ended"
        );
        Some(summary)
    }

    fn persist(&self) {
        let Some(repository) = &self.repository else {
            return;
        };
        if let Err(error) = repository.save(&self.document) {
            tracing::warn!(%error, "failed to persist rollout aggregates");
        }
    }

    pub fn aggregates(&self) -> &AggregateDocument {
        &self.document
    }

    pub fn thresholds(&self) -> &RollbackThresholds {
        &self.thresholds
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }
}
