//! Media object and session type definitions
//!
//! Supporting types for media object lifecycle and interruption tracking.

use serde::{Deserialize, Serialize};

/// Stable reference to a registered media object
///
/// Handles are slots in the registry arena. The generation is bumped every
/// time a slot is freed, so a handle held past unregistration never resolves
/// to the object that later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle {
    /// Slot index in the registry arena
    pub index: u32,
    /// Slot generation at registration time
    pub generation: u32,
}

impl std::fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "media#{}v{}", self.index, self.generation)
    }
}

/// Activity state of a media object as seen by the coordinator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    /// Registered but not producing sound (includes user-paused)
    #[default]
    Idle,
    /// Producing or capturing audio
    Active,
    /// Paused by the coordinator because the OS interrupted the session
    PausedByInterruption,
    /// Paused by the coordinator because the app entered the background
    PausedByBackground,
}

impl ActivityState {
    /// True while the object is producing or capturing audio
    pub fn is_active(self) -> bool {
        matches!(self, ActivityState::Active)
    }
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityState::Idle => write!(f, "idle"),
            ActivityState::Active => write!(f, "active"),
            ActivityState::PausedByInterruption => write!(f, "paused_by_interruption"),
            ActivityState::PausedByBackground => write!(f, "paused_by_background"),
        }
    }
}

/// Last-known interruption phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionPhase {
    #[default]
    None,
    Began,
    Ended,
}

/// Component that reported an error event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    Arbiter,
    Interruption,
    MediaServicesReset,
    Lifecycle,
    Registry,
}
