//! Audio category and option enumerations
//!
//! Discriminants are fixed: hosts exchange these values as integers.

use serde::{Deserialize, Serialize};

/// Audio session category requested from the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioCategory {
    /// Mixable, silenced by the ring/silent switch
    Ambient,
    /// Non-mixable, silenced by the ring/silent switch
    #[default]
    SoloAmbient,
    /// Playback that ignores the silent switch
    Playback,
    /// Recording only
    Record,
    /// Simultaneous playback and recording
    PlayAndRecord,
}

impl AudioCategory {
    /// True for categories that capture audio
    pub fn records(self) -> bool {
        matches!(self, AudioCategory::Record | AudioCategory::PlayAndRecord)
    }

    /// Host-facing category name
    pub fn as_str(self) -> &'static str {
        match self {
            AudioCategory::Ambient => "ambient",
            AudioCategory::SoloAmbient => "solo_ambient",
            AudioCategory::Playback => "playback",
            AudioCategory::Record => "record",
            AudioCategory::PlayAndRecord => "play_and_record",
        }
    }
}

impl std::fmt::Display for AudioCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the session treats audio from other applications
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum InterruptionMode {
    MixWithOthers = 0,
    #[default]
    DoNotMix = 1,
    DuckOthers = 2,
}

impl TryFrom<u8> for InterruptionMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InterruptionMode::MixWithOthers),
            1 => Ok(InterruptionMode::DoNotMix),
            2 => Ok(InterruptionMode::DuckOthers),
            other => Err(other),
        }
    }
}

/// Encoder bit-rate strategy for recordings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BitRateStrategy {
    Constant = 0,
    LongTermAverage = 1,
    VariableConstrained = 2,
    Variable = 3,
}

impl TryFrom<u8> for BitRateStrategy {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BitRateStrategy::Constant),
            1 => Ok(BitRateStrategy::LongTermAverage),
            2 => Ok(BitRateStrategy::VariableConstrained),
            3 => Ok(BitRateStrategy::Variable),
            other => Err(other),
        }
    }
}

/// Options applied together with a category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct CategoryOptions {
    pub interruption_mode: InterruptionMode,
    /// Only meaningful for recording categories
    #[serde(default)]
    pub bit_rate_strategy: Option<BitRateStrategy>,
}
