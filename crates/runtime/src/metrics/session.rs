//! Per-level rollout session: samples, counters, anomalies, rollback latch.

use std::collections::VecDeque;

use guard_core::{BehaviorState, Timestamp};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use super::MetricsConfig;
use crate::rollout::RollbackThresholds;

/// One guard frame as seen by the rollout monitor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricSample {
    pub at: Timestamp,
    pub state: BehaviorState,
    pub speed: f32,
    /// The guard carried a stuck flag this frame.
    pub stuck: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub samples: u64,
    pub stuck_frames: u64,
    pub stuck_events: u64,
    pub fallback_triggers: u64,
    pub anomalies: u64,
    pub state_transitions: u64,
    pub zero_velocity_frames: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AnomalyKind {
    SustainedZeroVelocity,
    StateLoop,
    TransitionBurst,
    FallbackBurst,
}

impl AnomalyKind {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RollbackReason {
    StuckRate,
    FallbackRate,
    AnomalyRate,
}

/// Latched advice to return a level to the legacy path.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecommendation {
    pub reason: RollbackReason,
    pub rate: f64,
    pub threshold: f64,
    pub samples: u64,
    pub at: Timestamp,
}

/// Rates derived from a session's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionRates {
    pub stuck: f64,
    pub fallback: f64,
    pub anomaly: f64,
}

#[derive(Clone, Debug)]
pub struct RolloutSession {
    pub level: u32,
    pub started_at: Timestamp,
    pub counters: SessionCounters,
    samples: VecDeque<MetricSample>,
    speed_sum: f64,
    zero_run: u32,
    transitions: VecDeque<(Timestamp, BehaviorState, BehaviorState)>,
    fallbacks: VecDeque<Timestamp>,
    last_anomaly: [Option<Timestamp>; AnomalyKind::COUNT],
    anomalies: Vec<Anomaly>,
    rollback: Option<RollbackRecommendation>,
    last_at: Timestamp,
}

impl RolloutSession {
    pub fn new(level: u32, started_at: Timestamp) -> Self {
        Self {
            level,
            started_at,
            counters: SessionCounters::default(),
            samples: VecDeque::new(),
            speed_sum: 0.0,
            zero_run: 0,
            transitions: VecDeque::new(),
            fallbacks: VecDeque::new(),
            last_anomaly: [None; AnomalyKind::COUNT],
            anomalies: Vec::new(),
            rollback: None,
            last_at: started_at,
        }
    }

    pub(crate) fn record_sample(
        &mut self,
        sample: MetricSample,
        config: &MetricsConfig,
        thresholds: &RollbackThresholds,
    ) {
        self.touch(sample.at);
        self.counters.samples += 1;
        self.speed_sum += f64::from(sample.speed.max(0.0));
        if sample.stuck {
            self.counters.stuck_frames += 1;
        }

        if sample.speed.abs() <= config.zero_speed_epsilon {
            self.counters.zero_velocity_frames += 1;
            self.zero_run += 1;
            if self.zero_run >= config.zero_velocity_frames {
                self.raise(AnomalyKind::SustainedZeroVelocity, sample.at, config);
            }
        } else {
            self.zero_run = 0;
        }

        if self.samples.len() >= config.max_retained_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.evaluate_rollback(sample.at, thresholds);
    }

    pub(crate) fn record_stuck_event(&mut self, at: Timestamp, thresholds: &RollbackThresholds) {
        self.touch(at);
        self.counters.stuck_events += 1;
        self.evaluate_rollback(at, thresholds);
    }

    pub(crate) fn record_fallback_trigger(
        &mut self,
        at: Timestamp,
        config: &MetricsConfig,
        thresholds: &RollbackThresholds,
    ) {
        self.touch(at);
        self.counters.fallback_triggers += 1;
        self.fallbacks.push_back(at);
        while self
            .fallbacks
            .front()
            .is_some_and(|t| at.since(*t) > config.fallback_burst_window_ms)
        {
            self.fallbacks.pop_front();
        }
        if self.fallbacks.len() >= config.fallback_burst_count {
            self.raise(AnomalyKind::FallbackBurst, at, config);
        }
        self.evaluate_rollback(at, thresholds);
    }

    pub(crate) fn record_state_transition(
        &mut self,
        from: BehaviorState,
        to: BehaviorState,
        at: Timestamp,
        config: &MetricsConfig,
        thresholds: &RollbackThresholds,
    ) {
        self.touch(at);
        self.counters.state_transitions += 1;
        self.transitions.push_back((at, from, to));
        while self
            .transitions
            .front()
            .is_some_and(|(t, _, _)| at.since(*t) > config.loop_window_ms)
        {
            self.transitions.pop_front();
        }

        let repeats = self
            .transitions
            .iter()
            .filter(|(_, f, t)| *f == from && *t == to)
            .count();
        if repeats >= config.loop_repeat_count {
            self.raise(AnomalyKind::StateLoop, at, config);
        }

        let burst = self
            .transitions
            .iter()
            .filter(|(t, _, _)| at.since(*t) <= config.burst_window_ms)
            .count();
        if burst > config.burst_max_transitions {
            self.raise(AnomalyKind::TransitionBurst, at, config);
        }
        self.evaluate_rollback(at, thresholds);
    }

    /// Records an anomaly unless the same kind fired within the dedupe window.
    fn raise(&mut self, kind: AnomalyKind, at: Timestamp, config: &MetricsConfig) {
        let slot = &mut self.last_anomaly[kind.index()];
        if slot.is_some_and(|last| at.since(last) < config.anomaly_dedupe_ms) {
            return;
        }
        *slot = Some(at);
        self.counters.anomalies += 1;
        self.anomalies.push(Anomaly { kind, at });
        tracing::warn!(level = self.level, %kind, %at, "rollout anomaly");
    }

    fn evaluate_rollback(&mut self, at: Timestamp, thresholds: &RollbackThresholds) {
        if self.rollback.is_some() || self.counters.samples < thresholds.min_samples {
            return;
        }
        let rates = self.rates();
        let breach = [
            (RollbackReason::StuckRate, rates.stuck, thresholds.stuck_rate),
            (RollbackReason::FallbackRate, rates.fallback, thresholds.fallback_rate),
            (RollbackReason::AnomalyRate, rates.anomaly, thresholds.anomaly_rate),
        ]
        .into_iter()
        .find(|(_, rate, threshold)| rate > threshold);

        if let Some((reason, rate, threshold)) = breach {
            tracing::warn!(
                level = self.level,
                %reason,
                rate,
                threshold,
                samples = self.counters.samples,
                "rollback recommended"
            );
            self.rollback = Some(RollbackRecommendation {
                reason,
                rate,
                threshold,
                samples: self.counters.samples,
                at,
            });
        }
    }

    fn touch(&mut self, at: Timestamp) {
        self.last_at = self.last_at.max(at);
    }

    pub fn rates(&self) -> SessionRates {
        let samples = self.counters.samples;
        if samples == 0 {
            return SessionRates::default();
        }
        let n = samples as f64;
        SessionRates {
            stuck: self.counters.stuck_frames as f64 / n,
            fallback: self.counters.fallback_triggers as f64 / n,
            anomaly: self.counters.anomalies as f64 / n,
        }
    }

    pub fn average_speed(&self) -> f64 {
        if self.counters.samples == 0 {
            0.0
        } else {
            self.speed_sum / self.counters.samples as f64
        }
    }

    pub fn rollback(&self) -> Option<RollbackRecommendation> {
        self.rollback
    }

    /// Unhealthy once rollback is recommended; degraded when any rate is past
    /// half its threshold or an anomaly fired.
    pub fn health(&self, thresholds: &RollbackThresholds) -> HealthStatus {
        if self.rollback.is_some() {
            return HealthStatus::Unhealthy;
        }
        let rates = self.rates();
        let near_limit = rates.stuck > thresholds.stuck_rate * 0.5
            || rates.fallback > thresholds.fallback_rate * 0.5
            || rates.anomaly > thresholds.anomaly_rate * 0.5;
        if near_limit || self.counters.anomalies > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Most recent samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn duration_ms(&self) -> u64 {
        self.last_at.since(self.started_at)
    }
}
