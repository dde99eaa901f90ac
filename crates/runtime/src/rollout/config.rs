//! Rollout enablement and rollback thresholds.
use std::collections::BTreeSet;
use std::env;

use strum::{Display, EnumString};

/// Run-time override that beats every other enablement source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum RolloutOverride {
    #[strum(serialize = "on", serialize = "enable", serialize = "true")]
    ForceEnable,
    #[strum(serialize = "off", serialize = "disable", serialize = "false")]
    ForceDisable,
}

/// Which source decided a level's enablement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DecisionSource {
    Override,
    MasterSwitch,
    CanaryList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RolloutDecision {
    pub enabled: bool,
    pub source: DecisionSource,
}

/// Rates above which a session recommends rolling back to the legacy path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RollbackThresholds {
    /// Samples required before any rate is trusted.
    pub min_samples: u64,
    pub stuck_rate: f64,
    pub fallback_rate: f64,
    pub anomaly_rate: f64,
}

impl Default for RollbackThresholds {
    fn default() -> Self {
        Self {
            min_samples: 30,
            stuck_rate: 0.10,
            fallback_rate: 0.05,
            anomaly_rate: 0.05,
        }
    }
}

/// Staged enablement of the orchestrated guard behavior.
///
/// Precedence: override > master switch > per-level canary list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RolloutConfig {
    /// `Some(true)` enables every level, `Some(false)` disables every level.
    pub master: Option<bool>,
    pub canary_levels: BTreeSet<u32>,
    pub override_mode: Option<RolloutOverride>,
    pub thresholds: RollbackThresholds,
}

impl RolloutConfig {
    pub fn with_canary_levels(levels: impl IntoIterator<Item = u32>) -> Self {
        Self {
            canary_levels: levels.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `GUARD_AI_ENABLED` - Master switch for every level (default: unset)
    /// - `GUARD_AI_CANARY_LEVELS` - Comma-separated level indices (default: none)
    /// - `GUARD_AI_FORCE` - Override, `on` or `off` (default: unset)
    /// - `GUARD_AI_MIN_SAMPLES` - Samples before rollback is considered (default: 30)
    /// - `GUARD_AI_STUCK_RATE` - Stuck-frame rate threshold (default: 0.10)
    /// - `GUARD_AI_FALLBACK_RATE` - Fallback rate threshold (default: 0.05)
    /// - `GUARD_AI_ANOMALY_RATE` - Anomaly rate threshold (default: 0.05)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.master = read_var::<bool>(&lookup, "GUARD_AI_ENABLED");

        if let Some(levels) = lookup("GUARD_AI_CANARY_LEVELS") {
            config.canary_levels = levels
                .split(',')
                .filter_map(|level| level.trim().parse().ok())
                .collect();
        }

        config.override_mode = read_var::<RolloutOverride>(&lookup, "GUARD_AI_FORCE");

        if let Some(min) = read_var::<u64>(&lookup, "GUARD_AI_MIN_SAMPLES") {
            config.thresholds.min_samples = min;
        }
        if let Some(rate) = read_var::<f64>(&lookup, "GUARD_AI_STUCK_RATE") {
            config.thresholds.stuck_rate = rate;
        }
        if let Some(rate) = read_var::<f64>(&lookup, "GUARD_AI_FALLBACK_RATE") {
            config.thresholds.fallback_rate = rate;
        }
        if let Some(rate) = read_var::<f64>(&lookup, "GUARD_AI_ANOMALY_RATE") {
            config.thresholds.anomaly_rate = rate;
        }

        config
    }

    pub fn decision(&self, level: u32) -> RolloutDecision {
        if let Some(mode) = self.override_mode {
            return RolloutDecision {
                enabled: mode == RolloutOverride::ForceEnable,
                source: DecisionSource::Override,
            };
        }
        if let Some(enabled) = self.master {
            return RolloutDecision {
                enabled,
                source: DecisionSource::MasterSwitch,
            };
        }
        RolloutDecision {
            enabled: self.canary_levels.contains(&level),
            source: DecisionSource::CanaryList,
        }
    }

    pub fn is_enabled_for(&self, level: u32) -> bool {
        self.decision(level).enabled
    }

    pub fn force_enable(&mut self) {
        tracing::info!("rollout override: force enable");
        self.override_mode = Some(RolloutOverride::ForceEnable);
    }

    pub fn force_disable(&mut self) {
        tracing::info!("rollout override: force disable");
        self.override_mode = Some(RolloutOverride::ForceDisable);
    }

    pub fn clear_override(&mut self) {
        self.override_mode = None;
    }
}

fn read_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    lookup(key)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn canary_list_applies_without_switches() {
        let config = RolloutConfig::from_lookup(lookup(&[("GUARD_AI_CANARY_LEVELS", "1, 4,x,7")]));
        assert!(config.is_enabled_for(4));
        assert!(!config.is_enabled_for(2));
        assert_eq!(config.canary_levels.len(), 3);
        assert_eq!(config.decision(7).source, DecisionSource::CanaryList);
    }

    #[test]
    fn master_switch_beats_canary_list() {
        let config = RolloutConfig::from_lookup(lookup(&[
            ("GUARD_AI_ENABLED", "false"),
            ("GUARD_AI_CANARY_LEVELS", "1"),
        ]));
        assert!(!config.is_enabled_for(1));

        let config = RolloutConfig::from_lookup(lookup(&[("GUARD_AI_ENABLED", "true")]));
        assert!(config.is_enabled_for(99));
    }

    #[test]
    fn override_beats_master_switch() {
        let mut config = RolloutConfig::from_lookup(lookup(&[
            ("GUARD_AI_ENABLED", "true"),
            ("GUARD_AI_FORCE", "OFF"),
        ]));
        assert_eq!(
            config.decision(1),
            RolloutDecision {
                enabled: false,
                source: DecisionSource::Override
            }
        );
        config.force_enable();
        assert!(config.is_enabled_for(1));
        config.clear_override();
        assert_eq!(config.decision(1).source, DecisionSource::MasterSwitch);
    }

    #[test]
    fn thresholds_read_from_lookup() {
        let config = RolloutConfig::from_lookup(lookup(&[
            ("GUARD_AI_MIN_SAMPLES", "100"),
            ("GUARD_AI_STUCK_RATE", "0.2"),
            ("GUARD_AI_ANOMALY_RATE", "nope"),
        ]));
        assert_eq!(config.thresholds.min_samples, 100);
        assert!((config.thresholds.stuck_rate - 0.2).abs() < 1e-12);
        assert!((config.thresholds.anomaly_rate - 0.05).abs() < 1e-12);
    }
}
