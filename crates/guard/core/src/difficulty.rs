//! Difficulty presets scaling guard reactions.
//!
//! A [`DifficultyProfile`] is a plain value; presets are constructors rather
//! than partial overrides merged into a base table.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Named difficulty preset.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
    Expert,
}

impl Difficulty {
    pub fn profile(self) -> DifficultyProfile {
        match self {
            Difficulty::Easy => DifficultyProfile::easy(),
            Difficulty::Normal => DifficultyProfile::normal(),
            Difficulty::Hard => DifficultyProfile::hard(),
            Difficulty::Expert => DifficultyProfile::expert(),
        }
    }
}

/// Multipliers applied on top of the per-component configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DifficultyProfile {
    pub difficulty: Difficulty,
    /// Scales every state's movement speed.
    pub speed_multiplier: f32,
    /// Scales hysteresis windows; lower reacts faster.
    pub reaction_multiplier: f32,
    /// Scales investigate/search/sweep durations.
    pub search_duration_multiplier: f32,
    /// Above 1.0 adds mid-edge points to room sweeps.
    pub sweep_density: f32,
    /// Awareness lost per second once the player is no longer sensed.
    pub awareness_decay: f32,
}

impl DifficultyProfile {
    pub const fn easy() -> Self {
        Self {
            difficulty: Difficulty::Easy,
            speed_multiplier: 0.85,
            reaction_multiplier: 1.4,
            search_duration_multiplier: 0.7,
            sweep_density: 1.0,
            awareness_decay: 0.6,
        }
    }

    pub const fn normal() -> Self {
        Self {
            difficulty: Difficulty::Normal,
            speed_multiplier: 1.0,
            reaction_multiplier: 1.0,
            search_duration_multiplier: 1.0,
            sweep_density: 1.0,
            awareness_decay: 0.4,
        }
    }

    pub const fn hard() -> Self {
        Self {
            difficulty: Difficulty::Hard,
            speed_multiplier: 1.1,
            reaction_multiplier: 0.75,
            search_duration_multiplier: 1.3,
            sweep_density: 1.5,
            awareness_decay: 0.25,
        }
    }

    pub const fn expert() -> Self {
        Self {
            difficulty: Difficulty::Expert,
            speed_multiplier: 1.2,
            reaction_multiplier: 0.5,
            search_duration_multiplier: 1.6,
            sweep_density: 2.0,
            awareness_decay: 0.15,
        }
    }

    /// Scales a duration in milliseconds by the reaction multiplier.
    pub fn reaction_ms(&self, base_ms: u64) -> u64 {
        (base_ms as f32 * self.reaction_multiplier).round() as u64
    }

    /// Scales a duration in milliseconds by the search-duration multiplier.
    pub fn search_ms(&self, base_ms: f32) -> f32 {
        base_ms * self.search_duration_multiplier
    }
}

impl Default for DifficultyProfile {
    fn default() -> Self {
        Self::normal()
    }
}

impl From<Difficulty> for DifficultyProfile {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(Difficulty::Expert.to_string(), "expert");
    }

    #[test]
    fn harder_presets_react_faster() {
        let mut previous = f32::MAX;
        for difficulty in Difficulty::iter() {
            let profile = difficulty.profile();
            assert_eq!(profile.difficulty, difficulty);
            assert!(profile.reaction_multiplier < previous);
            previous = profile.reaction_multiplier;
        }
    }
}
