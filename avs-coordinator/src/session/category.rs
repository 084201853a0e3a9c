//! Category validation and host-facing audio modes

use crate::error::{Error, Result};
use avs_common::events::{AudioCategory, BitRateStrategy, CategoryOptions, InterruptionMode};
use serde::Deserialize;

/// Reject category/options pairs the host cannot express
///
/// Recognized combinations:
/// - `SoloAmbient` and `Record` never mix, so only `DoNotMix` is accepted
/// - a bit-rate strategy is only accepted for recording categories
pub fn validate(category: AudioCategory, options: CategoryOptions) -> Result<()> {
    match category {
        AudioCategory::SoloAmbient | AudioCategory::Record
            if options.interruption_mode != InterruptionMode::DoNotMix =>
        {
            return Err(Error::InvalidCategory(format!(
                "{} does not support interruption mode {:?}",
                category, options.interruption_mode
            )));
        }
        _ => {}
    }

    if let Some(strategy) = options.bit_rate_strategy {
        if !category.records() {
            return Err(Error::InvalidCategory(format!(
                "bit-rate strategy {:?} requires a recording category, got {}",
                strategy, category
            )));
        }
    }

    Ok(())
}

/// High-level audio behaviour requested by the embedding app
///
/// Resolves to a category/options pair. Impossible combinations are rejected
/// before anything is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AudioMode {
    #[serde(default)]
    pub plays_in_silent_mode: bool,
    #[serde(default)]
    pub allows_recording: bool,
    /// False means audio focus is released when the app backgrounds
    #[serde(default)]
    pub stays_active_in_background: bool,
    #[serde(default)]
    pub interruption_mode: InterruptionMode,
    #[serde(default)]
    pub bit_rate_strategy: Option<BitRateStrategy>,
}

impl Default for AudioMode {
    fn default() -> Self {
        Self {
            plays_in_silent_mode: false,
            allows_recording: false,
            stays_active_in_background: false,
            interruption_mode: InterruptionMode::DoNotMix,
            bit_rate_strategy: None,
        }
    }
}

impl AudioMode {
    /// Category and options for this mode
    pub fn resolve(&self) -> Result<(AudioCategory, CategoryOptions)> {
        if !self.plays_in_silent_mode {
            if self.allows_recording {
                return Err(Error::InvalidCategory(
                    "recording requires playing in silent mode".to_string(),
                ));
            }
            if self.stays_active_in_background {
                return Err(Error::InvalidCategory(
                    "staying active in background requires playing in silent mode".to_string(),
                ));
            }
            if self.interruption_mode == InterruptionMode::DuckOthers {
                return Err(Error::InvalidCategory(
                    "ducking others requires playing in silent mode".to_string(),
                ));
            }
        }

        let category = if self.allows_recording {
            AudioCategory::PlayAndRecord
        } else if self.plays_in_silent_mode {
            AudioCategory::Playback
        } else if self.interruption_mode == InterruptionMode::DoNotMix {
            AudioCategory::SoloAmbient
        } else {
            AudioCategory::Ambient
        };

        let options = CategoryOptions {
            interruption_mode: self.interruption_mode,
            bit_rate_strategy: self.bit_rate_strategy,
        };
        validate(category, options)?;
        Ok((category, options))
    }
}
