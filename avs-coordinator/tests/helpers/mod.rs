//! Shared test fixtures: a recording delegation port and fake media objects

#![allow(dead_code)]

use avs_common::events::{AudioCategory, CategoryOptions};
use avs_common::{MediaHandle, SessionEvent};
use avs_coordinator::{
    AudioMode, Config, Coordinator, DelegationPort, MediaObject, PortError, PortResult, Tenant,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// One call observed by `RecordingPort`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    SetActive(bool),
    SetCategory(AudioCategory, CategoryOptions),
    DidBackground,
    DidForeground,
    WillDeallocate,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Delegation port that records every call and can be told to refuse
#[derive(Default)]
pub struct RecordingPort {
    calls: Mutex<Vec<PortCall>>,
    pub deny_activation: AtomicBool,
    pub refuse_deactivation: AtomicBool,
    pub refuse_category: AtomicBool,
    /// Milliseconds each `set_active(true)` blocks for
    pub activation_delay_ms: AtomicU64,
    on_activate: Mutex<Option<Hook>>,
    on_category: Mutex<Option<Hook>>,
}

impl RecordingPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<PortCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn activations(&self) -> usize {
        self.count(&PortCall::SetActive(true))
    }

    pub fn deactivations(&self) -> usize {
        self.count(&PortCall::SetActive(false))
    }

    pub fn category_calls(&self) -> Vec<(AudioCategory, CategoryOptions)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PortCall::SetCategory(category, options) => Some((category, options)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &PortCall) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    /// Run `hook` inside every `set_active(true)`, before it returns
    pub fn on_activate(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_activate.lock().unwrap() = Some(Box::new(hook));
    }

    /// Run `hook` inside every `set_category`, before it returns
    pub fn on_category(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_category.lock().unwrap() = Some(Box::new(hook));
    }

    fn record(&self, call: PortCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DelegationPort for RecordingPort {
    fn set_active(&self, _tenant: &Tenant, active: bool) -> PortResult {
        self.record(PortCall::SetActive(active));
        if active {
            let delay = self.activation_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                std::thread::sleep(Duration::from_millis(delay));
            }
            if let Some(hook) = self.on_activate.lock().unwrap().as_ref() {
                hook();
            }
            if self.deny_activation.load(Ordering::SeqCst) {
                return Err(PortError::new("focus held by a phone call"));
            }
        } else if self.refuse_deactivation.load(Ordering::SeqCst) {
            return Err(PortError::new("route busy"));
        }
        Ok(())
    }

    fn set_category(
        &self,
        _tenant: &Tenant,
        category: AudioCategory,
        options: CategoryOptions,
    ) -> PortResult {
        self.record(PortCall::SetCategory(category, options));
        if let Some(hook) = self.on_category.lock().unwrap().as_ref() {
            hook();
        }
        if self.refuse_category.load(Ordering::SeqCst) {
            return Err(PortError::new("category locked"));
        }
        Ok(())
    }

    fn did_background(&self, _tenant: &Tenant) {
        self.record(PortCall::DidBackground);
    }

    fn did_foreground(&self, _tenant: &Tenant) {
        self.record(PortCall::DidForeground);
    }

    fn will_deallocate(&self, _tenant: &Tenant) {
        self.record(PortCall::WillDeallocate);
    }
}

/// Media object counting coordinator callbacks
#[derive(Default)]
pub struct FakePlayer {
    pub background: bool,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    reinitializations: AtomicUsize,
}

impl FakePlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn background() -> Arc<Self> {
        Arc::new(Self {
            background: true,
            ..Self::default()
        })
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
}

impl MediaObject for FakePlayer {
    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn reinitialize(&self) {
        self.reinitializations.fetch_add(1, Ordering::SeqCst);
    }

    fn supports_background_playback(&self) -> bool {
        self.background
    }
}

/// Playback config that may keep focus in the background
pub fn playback_config(stays_active_in_background: bool) -> Config {
    Config {
        audio_mode: AudioMode {
            plays_in_silent_mode: true,
            stays_active_in_background,
            ..AudioMode::default()
        },
        ..Config::default()
    }
}

pub fn coordinator(port: &Arc<RecordingPort>) -> Coordinator {
    coordinator_with(port, playback_config(false))
}

pub fn coordinator_with(port: &Arc<RecordingPort>, config: Config) -> Coordinator {
    let port: Arc<dyn DelegationPort> = port.clone();
    Coordinator::new(port, config).expect("valid test config")
}

pub fn register(coordinator: &Coordinator, player: &Arc<FakePlayer>) -> MediaHandle {
    let object: Arc<dyn MediaObject> = player.clone();
    coordinator
        .register_for_audio_lifecycle(&object)
        .expect("registration succeeds")
}

/// Everything emitted so far
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
