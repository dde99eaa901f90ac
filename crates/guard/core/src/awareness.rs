//! Awareness integration for hosts without their own perception model.

use crate::config::AwarenessConfig;
use crate::difficulty::DifficultyProfile;

/// Integrates a per-frame sighting into the awareness scalar fed to
/// [`crate::StateMachine`].
#[derive(Clone, Debug)]
pub struct AwarenessMeter {
    config: AwarenessConfig,
    decay_per_second: f32,
    level: f32,
}

impl AwarenessMeter {
    pub fn new(config: AwarenessConfig, difficulty: &DifficultyProfile) -> Self {
        Self {
            config,
            decay_per_second: difficulty.awareness_decay,
            level: 0.0,
        }
    }

    /// Advances the meter by `dt_ms`.
    ///
    /// `sighting` is the distance to the player when sensed this frame.
    /// Closer sightings raise awareness faster; without one the level decays.
    pub fn observe(&mut self, sighting: Option<f32>, dt_ms: f32) -> f32 {
        let dt = dt_ms.max(0.0) / 1_000.0;
        match sighting {
            Some(distance) if distance <= self.config.sight_range => {
                let proximity = 1.0 - distance.max(0.0) / self.config.sight_range;
                let factor = proximity.max(self.config.min_range_factor);
                self.level += self.config.gain_per_second * factor * dt;
            }
            _ => self.level -= self.decay_per_second * dt,
        }
        self.level = self.level.clamp(0.0, self.config.max_level);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn set_difficulty(&mut self, difficulty: &DifficultyProfile) {
        self.decay_per_second = difficulty.awareness_decay;
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_sighting_rises_faster_than_distant() {
        let profile = DifficultyProfile::normal();
        let mut near = AwarenessMeter::new(AwarenessConfig::default(), &profile);
        let mut far = AwarenessMeter::new(AwarenessConfig::default(), &profile);
        near.observe(Some(10.0), 500.0);
        far.observe(Some(240.0), 500.0);
        assert!(near.level() > far.level());
        assert!(far.level() > 0.0);
    }

    #[test]
    fn out_of_range_decays_and_clamps_to_zero() {
        let profile = DifficultyProfile::normal();
        let mut meter = AwarenessMeter::new(AwarenessConfig::default(), &profile);
        meter.observe(Some(0.0), 400.0);
        assert!((meter.level() - 1.0).abs() < 1e-4);
        meter.observe(Some(1_000.0), 1_000.0);
        assert!((meter.level() - 0.6).abs() < 1e-4);
        meter.observe(None, 10_000.0);
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn level_never_exceeds_max() {
        let mut meter =
            AwarenessMeter::new(AwarenessConfig::default(), &DifficultyProfile::expert());
        for _ in 0..100 {
            meter.observe(Some(0.0), 100.0);
        }
        assert_eq!(meter.level(), 3.0);
    }
}
