//! Daily aggregate document persisted across play sessions.
//!
//! ```json
//! {
//!   "2026-03-14": {
//!     "level_3": { "sessions": 2, "samples": 4810, "avg_stuck_rate": 0.04, ... }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::SessionSummary;

/// Counters and running averages for one level on one day.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelAggregate {
    pub sessions: u64,
    pub samples: u64,
    pub stuck_frames: u64,
    pub stuck_events: u64,
    pub fallback_triggers: u64,
    pub anomalies: u64,
    pub state_transitions: u64,
    pub zero_velocity_frames: u64,
    pub avg_stuck_rate: f64,
    pub avg_velocity: f64,
}

impl LevelAggregate {
    /// Folds one finished session in; averages are per session.
    pub fn fold(&mut self, summary: &SessionSummary) {
        let prior = self.sessions as f64;
        let counters = &summary.counters;
        self.sessions += 1;
        self.samples += counters.samples;
        self.stuck_frames += counters.stuck_frames;
        self.stuck_events += counters.stuck_events;
        self.fallback_triggers += counters.fallback_triggers;
        self.anomalies += counters.anomalies;
        self.state_transitions += counters.state_transitions;
        self.zero_velocity_frames += counters.zero_velocity_frames;
        self.avg_stuck_rate = (self.avg_stuck_rate * prior + summary.rates.stuck) / (prior + 1.0);
        self.avg_velocity = (self.avg_velocity * prior + summary.average_speed) / (prior + 1.0);
    }
}

pub fn level_key(level: u32) -> String {
    format!("level_{level}")
}

/// ISO date → `level_<n>` → aggregate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateDocument {
    days: BTreeMap<String, BTreeMap<String, LevelAggregate>>,
}

impl AggregateDocument {
    pub fn fold(&mut self, date: NaiveDate, summary: &SessionSummary) {
        self.days
            .entry(date.format("%Y-%m-%d").to_string())
            .or_default()
            .entry(level_key(summary.level))
            .or_default()
            .fold(summary);
    }

    pub fn level(&self, date: NaiveDate, level: u32) -> Option<&LevelAggregate> {
        self.days
            .get(&date.format("%Y-%m-%d").to_string())?
            .get(&level_key(level))
    }

    /// Drops days older than `retention_days` before `today`.
    ///
    /// Keys that do not parse as dates are dropped as well.
    pub fn retain_days(&mut self, today: NaiveDate, retention_days: u32) -> usize {
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(retention_days)))
            .unwrap_or(NaiveDate::MIN);
        let before = self.days.len();
        self.days.retain(|key, _| {
            NaiveDate::parse_from_str(key, "%Y-%m-%d").is_ok_and(|date| date >= cutoff)
        });
        before - self.days.len()
    }

    /// Days in ascending order with their level records.
    pub fn days(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, LevelAggregate>)> {
        self.days.iter().map(|(day, levels)| (day.as_str(), levels))
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
