//! Audio session coordinator
//!
//! Owns the registry, the session arbiter, the interruption handler and the
//! lifecycle bridge, and is the only entry point for media objects and for
//! OS/app signals.
//!
//! **Architecture:**
//! - Media objects call `register_for_audio_lifecycle`, then `activate` /
//!   `deactivate` (or the raw promote/demote pair) on their own threads
//! - OS and lifecycle notifications go through `post`, which serializes them
//!   on a single-drainer queue
//! - An optional async `pump` forwards signals from a tokio channel
//! - Every state change is published on the `EventBus`

use crate::config::Config;
use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::interruption::{InterruptionHandler, InterruptionState};
use crate::lifecycle::LifecycleBridge;
use crate::port::{DelegationPort, PortBinding, Tenant};
use crate::registry::{EntryStatus, MediaObject, Registry};
use crate::session::{AudioMode, SessionArbiter};
use crate::signal::{InterruptionEvent, Signal, SignalQueue};
use avs_common::events::{
    AudioCategory, CategoryOptions, ErrorOrigin, EventBus, InterruptionPhase, SessionEvent,
};
use avs_common::{ActivityState, MediaHandle};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Process-wide audio session coordinator
pub struct Coordinator {
    ctx: SessionContext,
    interruption: InterruptionHandler,
    lifecycle: LifecycleBridge,
    signals: SignalQueue,
    /// Set once at teardown; stops the signal pump
    shutdown: watch::Sender<bool>,
}

impl Coordinator {
    /// Create a coordinator bound to `port`
    ///
    /// # Errors
    ///
    /// Returns `InvalidCategory` if the configured audio mode does not
    /// resolve to a recognized category.
    pub fn new(port: Arc<dyn DelegationPort>, config: Config) -> Result<Self> {
        let (category, options) = config.audio_mode.resolve()?;
        let events = EventBus::new(config.event_capacity);
        let binding = Arc::new(PortBinding::new(config.tenant, port));
        let arbiter = SessionArbiter::new(Arc::clone(&binding), events.clone(), category, options);
        let (shutdown, _) = watch::channel(false);

        info!(
            "Audio session coordinator created for {} (category {})",
            binding.tenant(),
            category
        );

        Ok(Self {
            ctx: SessionContext {
                registry: Mutex::new(Registry::new()),
                arbiter,
                port: binding,
                events,
            },
            interruption: InterruptionHandler::default(),
            lifecycle: LifecycleBridge::new(config.audio_mode.stays_active_in_background),
            signals: SignalQueue::default(),
            shutdown,
        })
    }

    // ------------------------------------------------------------------
    // Registration surface
    // ------------------------------------------------------------------

    /// Start tracking `object`
    ///
    /// The registry keeps only a weak reference; dropping the object
    /// unregisters it on the next sweep and releases its promotion.
    pub fn register_for_audio_lifecycle(&self, object: &Arc<dyn MediaObject>) -> Result<MediaHandle> {
        if self.lifecycle.is_torn_down() {
            return Err(Error::PortUnavailable);
        }
        self.ctx.collect_garbage(ErrorOrigin::Registry);
        self.drain_deferred();

        let result = self.ctx.registry().register(object);
        match &result {
            Ok(handle) => debug!("Media object registered as {}", handle),
            Err(e) => warn!("Ignoring registration: {}", e),
        }
        result
    }

    /// Stop tracking `handle`; unknown handles are ignored
    ///
    /// An object that still held a promotion gives it back.
    pub fn unregister_for_audio_lifecycle(&self, handle: MediaHandle) -> Result<()> {
        let Some(status) = self.ctx.registry().unregister(handle) else {
            debug!("Unregister of {} ignored: not registered", handle);
            return Ok(());
        };
        self.interruption.release(&[handle]);
        self.lifecycle.release(&[handle]);
        if status.holds_promotion {
            return self.settle(self.ctx.arbiter.demote());
        }
        Ok(())
    }

    /// Promote the session on behalf of `handle` and mark it active
    ///
    /// Already-active objects are left alone. On `ActivationDenied` the
    /// object keeps its previous state and must not produce audio.
    pub fn activate(&self, handle: MediaHandle) -> Result<()> {
        self.settle(self.activate_object(handle))
    }

    fn activate_object(&self, handle: MediaHandle) -> Result<()> {
        self.ctx.collect_garbage(ErrorOrigin::Registry);

        let previous = self
            .ctx
            .registry()
            .status(handle)
            .ok_or(Error::UnknownObject(handle))?;
        if previous.state.is_active() && previous.holds_promotion {
            debug!("{} already active", handle);
            return Ok(());
        }

        self.ctx.arbiter.promote()?;

        let active = EntryStatus {
            state: ActivityState::Active,
            holds_promotion: true,
        };
        let replaced = self.ctx.registry().set_status(handle, active);
        match replaced {
            Ok(replaced) => {
                if replaced.holds_promotion {
                    // Raced with another activate of the same object
                    self.ctx.arbiter.demote()?;
                }
                self.ctx.emit_transition(handle, replaced.state, ActivityState::Active);
                Ok(())
            }
            Err(e) => {
                // Unregistered while the port call was in flight
                self.ctx.arbiter.demote()?;
                Err(e)
            }
        }
    }

    /// Mark `handle` idle and release its promotion
    ///
    /// A paused object that is deactivated is not resumed by a later
    /// interruption end or foreground transition.
    pub fn deactivate(&self, handle: MediaHandle) -> Result<()> {
        let idle = EntryStatus {
            state: ActivityState::Idle,
            holds_promotion: false,
        };
        let previous = self.ctx.registry().set_status(handle, idle)?;
        self.ctx.emit_transition(handle, previous.state, ActivityState::Idle);
        if previous.holds_promotion {
            return self.settle(self.ctx.arbiter.demote());
        }
        Ok(())
    }

    /// Add one promotion not tied to a registered object
    pub fn promote_audio_session_if_necessary(&self) -> Result<()> {
        if self.lifecycle.is_torn_down() {
            return Err(Error::PortUnavailable);
        }
        self.ctx.collect_garbage(ErrorOrigin::Registry);
        self.settle(self.ctx.arbiter.promote())
    }

    /// Release one promotion; a no-op at zero
    pub fn demote_audio_session_if_possible(&self) -> Result<()> {
        self.ctx.collect_garbage(ErrorOrigin::Registry);
        self.settle(self.ctx.arbiter.demote())
    }

    /// Store a category, applying it now if the session is held
    pub fn set_category(&self, category: AudioCategory, options: CategoryOptions) -> Result<()> {
        self.settle(self.ctx.arbiter.set_category(category, options))
    }

    /// Apply a host-level audio mode
    pub fn set_audio_mode(&self, mode: &AudioMode) -> Result<()> {
        let (category, options) = mode.resolve()?;
        self.settle(self.ctx.arbiter.set_category(category, options))?;
        self.lifecycle
            .set_stays_active_in_background(mode.stays_active_in_background);
        Ok(())
    }

    /// Handle signals the port raised during the call that produced `result`
    fn settle<T>(&self, result: Result<T>) -> Result<T> {
        self.drain_deferred();
        result
    }

    // ------------------------------------------------------------------
    // Signal surface
    // ------------------------------------------------------------------

    /// Deliver an OS or lifecycle signal
    ///
    /// Runs the signal to completion unless another caller is already
    /// draining the queue, in which case that caller processes it. A signal
    /// posted from inside one of this coordinator's port calls is held until
    /// the call that made it returns. Signals arriving after teardown are
    /// dropped.
    pub fn post(&self, signal: Signal) {
        if self.lifecycle.is_torn_down() {
            debug!("Dropping {:?}: coordinator torn down", signal);
            return;
        }
        if self.ctx.arbiter.in_port_call() {
            self.signals.defer(signal);
            debug!("Deferred {:?} until the port call returns", signal);
            return;
        }
        if !self.signals.push(signal) {
            debug!("Queued {:?} behind the active drain", signal);
            return;
        }
        self.drain();
    }

    fn drain(&self) {
        while let Some(signal) = self.signals.next() {
            self.dispatch(signal);
        }
    }

    /// Drain signals deferred by a port call if nobody else is draining
    fn drain_deferred(&self) {
        if !self.ctx.arbiter.in_port_call() && self.signals.claim() {
            self.drain();
        }
    }

    pub fn handle_interruption(&self, event: InterruptionEvent) {
        self.post(event.into());
    }

    pub fn handle_media_services_reset(&self) {
        self.post(Signal::MediaServicesReset);
    }

    pub fn app_did_background(&self) {
        self.post(Signal::EnteredBackground);
    }

    pub fn app_did_foreground(&self) {
        self.post(Signal::EnteredForeground);
    }

    /// Tear the coordinator down; later promotions fail with `PortUnavailable`
    pub fn will_deallocate(&self) {
        self.post(Signal::WillDeallocate);
    }

    fn dispatch(&self, signal: Signal) {
        if self.lifecycle.is_torn_down() {
            debug!("Skipping {:?}: coordinator torn down", signal);
            return;
        }
        debug!("Handling {:?}", signal);
        match signal {
            Signal::Interruption(InterruptionEvent::Began) => self.interruption.began(&self.ctx),
            Signal::Interruption(InterruptionEvent::Ended { should_resume }) => {
                self.interruption_ended(should_resume)
            }
            Signal::MediaServicesReset => self.media_services_reset(),
            Signal::EnteredBackground => self.lifecycle.entered_background(&self.ctx),
            Signal::EnteredForeground => self.entered_foreground(),
            Signal::WillDeallocate => self.teardown(),
        }
    }

    fn interruption_ended(&self, should_resume: bool) {
        if should_resume && self.lifecycle.is_backgrounded() {
            // Objects that may not play in the background wait for the foreground
            let held = self.held_in_background(&self.interruption.snapshot());
            if !held.is_empty() {
                let moved = self.ctx.retag(
                    &held,
                    ActivityState::PausedByInterruption,
                    ActivityState::PausedByBackground,
                );
                self.interruption.release(&held);
                self.lifecycle.adopt(&moved);
                debug!("Deferred {} objects to the foreground", moved.len());
            }
        }
        self.interruption.ended(&self.ctx, should_resume);
    }

    fn held_in_background(&self, handles: &[MediaHandle]) -> Vec<MediaHandle> {
        let stays_active = self.lifecycle.stays_active_in_background();
        let objects: Vec<(MediaHandle, Arc<dyn MediaObject>)> = {
            let registry = self.ctx.registry();
            handles
                .iter()
                .filter_map(|handle| registry.get(*handle).map(|object| (*handle, object)))
                .collect()
        };
        objects
            .into_iter()
            .filter(|(_, object)| !(stays_active && object.supports_background_playback()))
            .map(|(handle, _)| handle)
            .collect()
    }

    fn entered_foreground(&self) {
        let interrupted = self.interruption.state() == InterruptionState::Interrupted;
        let deferred = self.lifecycle.entered_foreground(&self.ctx, interrupted);
        if !deferred.is_empty() {
            let moved = self.ctx.retag(
                &deferred,
                ActivityState::PausedByBackground,
                ActivityState::PausedByInterruption,
            );
            self.interruption.adopt(&moved);
        }
    }

    fn media_services_reset(&self) {
        warn!("Media services were reset; rebuilding the audio session");
        self.ctx.arbiter.reset();
        self.interruption.reset();
        self.lifecycle.reset();

        if let Err(e) = self.ctx.arbiter.reconfigure() {
            self.ctx.report(ErrorOrigin::MediaServicesReset, &e);
        }

        let mut live = Vec::new();
        {
            let mut registry = self.ctx.registry();
            registry.prune();
            registry.for_each_live(|handle, object, status| {
                live.push((handle, Arc::clone(object), status.state))
            });
            let idle = EntryStatus {
                state: ActivityState::Idle,
                holds_promotion: false,
            };
            for (handle, _, _) in &live {
                if let Err(e) = registry.set_status(*handle, idle) {
                    warn!("Could not mark {} idle after reset: {}", handle, e);
                }
            }
        }

        let reinitialized: Vec<MediaHandle> = live
            .into_iter()
            .map(|(handle, object, old_state)| {
                object.reinitialize();
                self.ctx.emit_transition(handle, old_state, ActivityState::Idle);
                handle
            })
            .collect();

        info!("Reinitialized {} media objects", reinitialized.len());
        self.ctx.events.emit_lossy(SessionEvent::MediaServicesReset {
            reinitialized,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Release the port before any media object state is touched
    fn teardown(&self) {
        if !self.lifecycle.begin_teardown() {
            debug!("Teardown already done");
            return;
        }
        let tenant = self.ctx.port.tenant().clone();
        info!("Tearing down audio session coordinator for {}", tenant);

        self.shutdown.send_replace(true);
        let dropped = self.signals.discard();
        if dropped > 0 {
            debug!("Discarded {} pending signals", dropped);
        }

        self.ctx.arbiter.release_all();
        if let Some(port) = self.ctx.port.unbind() {
            port.will_deallocate(&tenant);
        }

        let active = self.ctx.registry().clear();
        for (handle, object) in active {
            object.pause();
            self.ctx
                .emit_transition(handle, ActivityState::Active, ActivityState::Idle);
        }
        info!("Audio session coordinator torn down");
    }

    // ------------------------------------------------------------------
    // Async signal pump
    // ------------------------------------------------------------------

    /// Forward signals from `rx` until teardown or until the channel closes
    ///
    /// Each signal is handled on the blocking pool, since port calls and
    /// media object callbacks may block.
    pub async fn pump(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Signal>) {
        let mut shutdown = self.shutdown.subscribe();
        info!("Signal pump started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                signal = rx.recv() => {
                    let Some(signal) = signal else {
                        debug!("Signal channel closed");
                        break;
                    };
                    let coordinator = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || coordinator.post(signal)).await {
                        error!("Signal handler failed: {}", e);
                    }
                }
            }
        }

        info!("Signal pump stopped");
    }

    /// Spawn `pump` on the current runtime, returning its sender
    pub fn spawn_pump(self: &Arc<Self>) -> (mpsc::UnboundedSender<Signal>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Arc::clone(self).pump(rx));
        (tx, handle)
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.ctx.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    /// Current promotion count
    pub fn session_count(&self) -> usize {
        self.ctx.arbiter.count()
    }

    pub fn is_session_active(&self) -> bool {
        self.ctx.arbiter.is_active()
    }

    pub fn category(&self) -> (AudioCategory, CategoryOptions) {
        self.ctx.arbiter.category()
    }

    pub fn activity(&self, handle: MediaHandle) -> Option<ActivityState> {
        self.ctx.registry().status(handle).map(|status| status.state)
    }

    pub fn interruption_state(&self) -> InterruptionState {
        self.interruption.state()
    }

    pub fn interruption_phase(&self) -> InterruptionPhase {
        self.interruption.phase()
    }

    pub fn registered_count(&self) -> usize {
        self.ctx.registry().len()
    }

    pub fn tenant(&self) -> &Tenant {
        self.ctx.port.tenant()
    }

    pub fn is_backgrounded(&self) -> bool {
        self.lifecycle.is_backgrounded()
    }

    pub fn is_torn_down(&self) -> bool {
        self.lifecycle.is_torn_down()
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}
