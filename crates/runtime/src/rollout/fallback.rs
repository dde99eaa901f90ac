//! Per-level circuit breaker between the orchestrator and the legacy path.

use std::collections::HashMap;

use guard_core::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallbackConfig {
    /// Orchestrator errors that trip the breaker for a level.
    pub error_threshold: u32,
    /// How long a tripped level stays on the legacy path.
    pub cooldown_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            cooldown_ms: 30_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct LevelState {
    errors: u32,
    /// Some guard on the level errored since the last `end_frame`.
    errored_this_frame: bool,
    disabled_until: Option<Timestamp>,
}

#[derive(Clone, Debug, Default)]
pub struct FallbackManager {
    config: FallbackConfig,
    levels: HashMap<u32, LevelState>,
}

impl FallbackManager {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            levels: HashMap::new(),
        }
    }

    /// Counts an orchestrator error; returns true when this one trips the
    /// breaker.
    ///
    /// Errors accumulate across guards and frames until a frame in which no
    /// guard on the level errored.
    pub fn record_error(&mut self, level: u32, now: Timestamp) -> bool {
        let state = self.levels.entry(level).or_default();
        if state.disabled_until.is_some() {
            return false;
        }
        state.errored_this_frame = true;
        state.errors += 1;
        if state.errors < self.config.error_threshold {
            return false;
        }
        let until = now.saturating_add(self.config.cooldown_ms);
        state.disabled_until = Some(until);
        tracing::warn!(
            level,
            errors = state.errors,
            %until,
            "orchestrator disabled for level; using legacy controller"
        );
        true
    }

    /// Closes a frame for `level`; the error count resets only when every
    /// guard on the level ran clean during it.
    pub fn end_frame(&mut self, level: u32) {
        if let Some(state) = self.levels.get_mut(&level)
            && state.disabled_until.is_none()
        {
            if !state.errored_this_frame {
                state.errors = 0;
            }
            state.errored_this_frame = false;
        }
    }

    /// Whether the orchestrator is disabled for `level` at `now`.
    ///
    /// An expired cooldown re-enables the level and clears its errors.
    pub fn is_disabled(&mut self, level: u32, now: Timestamp) -> bool {
        let Some(state) = self.levels.get_mut(&level) else {
            return false;
        };
        match state.disabled_until {
            Some(until) if now >= until => {
                *state = LevelState::default();
                tracing::info!(level, "orchestrator re-enabled after fallback cooldown");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn error_count(&self, level: u32) -> u32 {
        self.levels.get(&level).map(|s| s.errors).unwrap_or(0)
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_threshold_and_recovers_after_cooldown() {
        let mut fallback = FallbackManager::default();
        assert!(!fallback.record_error(2, Timestamp(0)));
        assert!(!fallback.record_error(2, Timestamp(10)));
        assert!(fallback.record_error(2, Timestamp(20)));
        assert!(fallback.is_disabled(2, Timestamp(1_000)));
        assert!(!fallback.is_disabled(1, Timestamp(1_000)));

        assert!(!fallback.is_disabled(2, Timestamp(30_020)));
        assert_eq!(fallback.error_count(2), 0);
    }

    #[test]
    fn clean_frame_resets_errors() {
        let mut fallback = FallbackManager::default();
        fallback.record_error(5, Timestamp(0));
        fallback.end_frame(5);
        fallback.record_error(5, Timestamp(16));
        fallback.end_frame(5);
        assert_eq!(fallback.error_count(5), 2);

        fallback.end_frame(5);
        assert_eq!(fallback.error_count(5), 0);
        assert!(!fallback.record_error(5, Timestamp(48)));
        assert_eq!(fallback.error_count(5), 1);
    }
}
