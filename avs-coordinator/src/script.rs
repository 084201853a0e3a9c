//! Scenario scripts for driving a coordinator from the command line
//!
//! A scenario declares simulated players and a list of steps:
//!
//! ```toml
//! [[player]]
//! name = "music"
//! background = true
//!
//! [[step]]
//! action = "register"
//! player = "music"
//!
//! [[step]]
//! action = "interruption_ended"
//! should_resume = true
//! ```
//!
//! Steps whose operation fails are recorded and the run continues, the same
//! way a host keeps running after a refused activation.

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::registry::MediaObject;
use crate::signal::InterruptionEvent;
use avs_common::config::load_toml;
use avs_common::events::{AudioCategory, BitRateStrategy, CategoryOptions, InterruptionMode};
use avs_common::MediaHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSpec {
    pub name: String,
    /// Player may keep playing while the app is backgrounded
    #[serde(default)]
    pub background: bool,
}

/// One scripted operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Register { player: String },
    Activate { player: String },
    Deactivate { player: String },
    Unregister { player: String },
    /// Drop the script's reference so the registry sees the player die
    Destroy { player: String },
    Promote,
    Demote,
    InterruptionBegan,
    InterruptionEnded {
        #[serde(default)]
        should_resume: bool,
    },
    MediaServicesReset,
    Background,
    Foreground,
    SetCategory {
        category: AudioCategory,
        #[serde(default)]
        interruption_mode: InterruptionMode,
        #[serde(default)]
        bit_rate_strategy: Option<BitRateStrategy>,
    },
    Teardown,
}

impl Step {
    fn player(&self) -> Option<&str> {
        match self {
            Step::Register { player }
            | Step::Activate { player }
            | Step::Deactivate { player }
            | Step::Unregister { player }
            | Step::Destroy { player } => Some(player.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default, rename = "player")]
    pub players: Vec<PlayerSpec>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let scenario: Scenario = load_toml(path)?;
        scenario.validate()?;
        info!(
            "Loaded scenario {} ({} players, {} steps)",
            path.display(),
            scenario.players.len(),
            scenario.steps.len()
        );
        Ok(scenario)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let scenario: Scenario =
            toml::from_str(text).map_err(|e| Error::Scenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Every step must name a declared player
    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for spec in &self.players {
            if seen.contains(&spec.name.as_str()) {
                return Err(Error::Scenario(format!("player '{}' declared twice", spec.name)));
            }
            seen.push(spec.name.as_str());
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(name) = step.player() {
                if !seen.contains(&name) {
                    return Err(Error::Scenario(format!(
                        "step {} refers to undeclared player '{}'",
                        index + 1,
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Stand-in media object that logs and counts coordinator callbacks
#[derive(Debug)]
pub struct SimulatedPlayer {
    name: String,
    background: bool,
    playing: AtomicBool,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    reinitializations: AtomicUsize,
}

impl SimulatedPlayer {
    pub fn new(name: impl Into<String>, background: bool) -> Self {
        Self {
            name: name.into(),
            background,
            playing: AtomicBool::new(false),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            reinitializations: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn reinitializations(&self) -> usize {
        self.reinitializations.load(Ordering::SeqCst)
    }

    fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }
}

impl MediaObject for SimulatedPlayer {
    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.set_playing(false);
        debug!("Player '{}' paused", self.name);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.set_playing(true);
        debug!("Player '{}' resumed", self.name);
    }

    fn reinitialize(&self) {
        self.reinitializations.fetch_add(1, Ordering::SeqCst);
        self.set_playing(false);
        debug!("Player '{}' reinitialized", self.name);
    }

    fn supports_background_playback(&self) -> bool {
        self.background
    }
}

/// Result of one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub step: Step,
    /// Error returned by the operation, if any
    pub error: Option<String>,
}

/// Executes a scenario against a coordinator
pub struct ScenarioRunner<'a> {
    coordinator: &'a Coordinator,
    players: HashMap<String, Arc<SimulatedPlayer>>,
    handles: HashMap<String, MediaHandle>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(coordinator: &'a Coordinator, scenario: &Scenario) -> Self {
        let players = scenario
            .players
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    Arc::new(SimulatedPlayer::new(spec.name.clone(), spec.background)),
                )
            })
            .collect();
        Self {
            coordinator,
            players,
            handles: HashMap::new(),
        }
    }

    pub fn player(&self, name: &str) -> Option<&Arc<SimulatedPlayer>> {
        self.players.get(name)
    }

    pub fn handle(&self, name: &str) -> Option<MediaHandle> {
        self.handles.get(name).copied()
    }

    /// Run every step in order
    pub fn run(&mut self, steps: &[Step]) -> Vec<StepOutcome> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let error = self.execute(step).err().map(|e| {
                    warn!("Step {} ({:?}) failed: {}", index + 1, step, e);
                    e.to_string()
                });
                StepOutcome {
                    index: index + 1,
                    step: step.clone(),
                    error,
                }
            })
            .collect()
    }

    fn execute(&mut self, step: &Step) -> Result<()> {
        let coordinator = self.coordinator;
        match step {
            Step::Register { player } => {
                let object: Arc<dyn MediaObject> = self.live_player(player)?;
                let handle = coordinator.register_for_audio_lifecycle(&object)?;
                self.handles.insert(player.clone(), handle);
                Ok(())
            }
            Step::Activate { player } => {
                let handle = self.registered(player)?;
                coordinator.activate(handle)?;
                if let Some(object) = self.players.get(player) {
                    object.resume();
                }
                Ok(())
            }
            Step::Deactivate { player } => {
                let handle = self.registered(player)?;
                if let Some(object) = self.players.get(player) {
                    object.pause();
                }
                coordinator.deactivate(handle)
            }
            Step::Unregister { player } => {
                let handle = self.registered(player)?;
                coordinator.unregister_for_audio_lifecycle(handle)
            }
            Step::Destroy { player } => {
                if self.players.remove(player).is_some() {
                    info!("Player '{}' destroyed", player);
                }
                Ok(())
            }
            Step::Promote => coordinator.promote_audio_session_if_necessary(),
            Step::Demote => coordinator.demote_audio_session_if_possible(),
            Step::InterruptionBegan => {
                coordinator.handle_interruption(InterruptionEvent::Began);
                Ok(())
            }
            Step::InterruptionEnded { should_resume } => {
                coordinator.handle_interruption(InterruptionEvent::Ended {
                    should_resume: *should_resume,
                });
                Ok(())
            }
            Step::MediaServicesReset => {
                coordinator.handle_media_services_reset();
                Ok(())
            }
            Step::Background => {
                coordinator.app_did_background();
                Ok(())
            }
            Step::Foreground => {
                coordinator.app_did_foreground();
                Ok(())
            }
            Step::SetCategory {
                category,
                interruption_mode,
                bit_rate_strategy,
            } => coordinator.set_category(
                *category,
                CategoryOptions {
                    interruption_mode: *interruption_mode,
                    bit_rate_strategy: *bit_rate_strategy,
                },
            ),
            Step::Teardown => {
                coordinator.will_deallocate();
                Ok(())
            }
        }
    }

    fn live_player(&self, name: &str) -> Result<Arc<SimulatedPlayer>> {
        self.players
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Scenario(format!("player '{}' was destroyed", name)))
    }

    fn registered(&self, name: &str) -> Result<MediaHandle> {
        self.handles
            .get(name)
            .copied()
            .ok_or_else(|| Error::Scenario(format!("player '{}' is not registered", name)))
    }
}
