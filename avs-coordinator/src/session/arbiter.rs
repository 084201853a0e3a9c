//! Session arbiter: reference-counted ownership of the audio session
//!
//! The arbiter owns the only shared mutable session state: the promotion
//! count, the stored category/options and whether the host currently grants
//! activation. All of it sits behind one mutex. Port calls are made with the
//! mutex released; the in-flight call is recorded as a `Transition` so that
//! concurrent callers either join it (activation) or wait it out
//! (deactivation) instead of issuing a second request.
//!
//! The arbiter also remembers which threads are inside a port call, so a
//! signal the port raises synchronously can be deferred until the call has
//! returned.

use crate::error::{Error, Result};
use crate::port::{PortBinding, PortError};
use crate::session::category;
use avs_common::events::{AudioCategory, CategoryOptions, EventBus, SessionEvent};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

const RESET_REASON: &str = "media services reset";
const INTERRUPTED_REASON: &str = "interrupted during activation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionKind {
    Activating,
    Deactivating,
}

/// Port call currently in flight
#[derive(Debug)]
struct Transition {
    kind: TransitionKind,
    attempt: u64,
    /// Promotions that ride on this activation and roll back with it
    joined: usize,
    /// Callers blocked on the outcome, excluding the one making the call
    waiters: usize,
}

/// Outcome kept until every waiter has read it
#[derive(Debug)]
struct Outcome {
    failure: Option<String>,
    waiters_left: usize,
}

#[derive(Debug)]
struct ArbiterState {
    count: usize,
    granted: bool,
    interrupted: bool,
    category: AudioCategory,
    options: CategoryOptions,
    /// Stored category differs from what the host last accepted
    category_dirty: bool,
    transition: Option<Transition>,
    outcomes: HashMap<u64, Outcome>,
    next_attempt: u64,
    /// Bumped by reset; results of port calls started before are dropped
    epoch: u64,
    /// Bumped by every interruption that begins
    interruptions: u64,
}

impl ArbiterState {
    fn begin(&mut self, kind: TransitionKind, joined: usize) -> u64 {
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.transition = Some(Transition {
            kind,
            attempt,
            joined,
            waiters: 0,
        });
        attempt
    }

    /// Remove the transition if it is still `attempt`
    fn finish(&mut self, attempt: u64) -> Option<Transition> {
        match &self.transition {
            Some(t) if t.attempt == attempt => self.transition.take(),
            _ => None,
        }
    }

    fn in_flight(&self, attempt: u64) -> bool {
        matches!(&self.transition, Some(t) if t.attempt == attempt)
    }

    fn record_outcome(&mut self, transition: &Transition, failure: Option<String>) {
        if transition.waiters > 0 {
            self.outcomes.insert(
                transition.attempt,
                Outcome {
                    failure,
                    waiters_left: transition.waiters,
                },
            );
        }
    }

    fn take_outcome(&mut self, attempt: u64) -> Option<String> {
        let Some(outcome) = self.outcomes.get_mut(&attempt) else {
            return Some(RESET_REASON.to_string());
        };
        outcome.waiters_left -= 1;
        let failure = outcome.failure.clone();
        if outcome.waiters_left == 0 {
            self.outcomes.remove(&attempt);
        }
        failure
    }
}

/// Process-wide session arbiter
pub struct SessionArbiter {
    state: Mutex<ArbiterState>,
    changed: Condvar,
    /// Threads currently inside a port call
    callers: Mutex<Vec<ThreadId>>,
    port: Arc<PortBinding>,
    events: EventBus,
}

impl SessionArbiter {
    /// Create an arbiter with an already validated category
    pub fn new(
        port: Arc<PortBinding>,
        events: EventBus,
        category: AudioCategory,
        options: CategoryOptions,
    ) -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                count: 0,
                granted: false,
                interrupted: false,
                category,
                options,
                category_dirty: false,
                transition: None,
                outcomes: HashMap::new(),
                next_attempt: 0,
                epoch: 0,
                interruptions: 0,
            }),
            changed: Condvar::new(),
            callers: Mutex::new(Vec::new()),
            port,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, ArbiterState>) -> MutexGuard<'a, ArbiterState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn callers(&self) -> MutexGuard<'_, Vec<ThreadId>> {
        self.callers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `call` with the current thread marked as inside a port call
    fn call_port<T>(&self, call: impl FnOnce() -> T) -> T {
        let id = thread::current().id();
        self.callers().push(id);
        let _guard = PortCallGuard { arbiter: self, id };
        call()
    }

    /// The current thread is inside a port call made by this arbiter
    pub fn in_port_call(&self) -> bool {
        let id = thread::current().id();
        self.callers().contains(&id)
    }

    /// Number of parties currently requiring the session
    pub fn count(&self) -> usize {
        self.lock().count
    }

    /// Session is active iff at least one party holds a promotion
    pub fn is_active(&self) -> bool {
        self.count() > 0
    }

    /// Host currently grants activation
    pub fn is_granted(&self) -> bool {
        self.lock().granted
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted
    }

    /// Stored category and options
    pub fn category(&self) -> (AudioCategory, CategoryOptions) {
        let state = self.lock();
        (state.category, state.options)
    }

    /// Increment the count by one, activating on 0→1
    pub fn promote(&self) -> Result<()> {
        self.promote_by(1)
    }

    /// Decrement the count by one, deactivating on 1→0
    pub fn demote(&self) -> Result<()> {
        self.demote_by(1)
    }

    /// Add `n` promotions as a single step
    ///
    /// When the host does not currently grant the session, one activation
    /// request is made. Callers arriving while that request is in flight
    /// add their promotions to it and share its outcome; on refusal every
    /// promotion in the window is rolled back.
    pub fn promote_by(&self, n: usize) -> Result<()> {
        let mut state = self.lock();
        loop {
            match state.transition.as_mut() {
                Some(t) if t.kind == TransitionKind::Activating => {
                    t.joined += n;
                    t.waiters += 1;
                    let attempt = t.attempt;
                    state.count += n;
                    debug!("Joining in-flight activation attempt {}", attempt);
                    while state.in_flight(attempt) {
                        state = self.wait(state);
                    }
                    return match state.take_outcome(attempt) {
                        None => Ok(()),
                        Some(reason) => Err(Error::ActivationDenied(reason)),
                    };
                }
                Some(_) => state = self.wait(state),
                None => break,
            }
        }

        if state.granted && !state.category_dirty {
            state.count += n;
            debug!("Promoted audio session by {} (count={})", n, state.count);
            return Ok(());
        }
        if n == 0 && state.count == 0 {
            return Ok(());
        }

        let port = self.port.get()?;
        let tenant = self.port.tenant().clone();
        let was_granted = state.granted;
        let (category, options) = (state.category, state.options);
        let epoch = state.epoch;
        let interruptions = state.interruptions;
        let attempt = state.begin(TransitionKind::Activating, n);
        state.count += n;
        drop(state);

        debug!("Requesting audio session activation for {} ({})", tenant, category);
        let result = self.call_port(|| {
            port.set_category(&tenant, category, options).and_then(|_| {
                if was_granted {
                    Ok(())
                } else {
                    port.set_active(&tenant, true)
                }
            })
        });

        let mut state = self.lock();
        let Some(transition) = state.finish(attempt) else {
            // A reset discarded this attempt and already settled its waiters
            debug!("Activation attempt {} superseded (epoch {})", attempt, epoch);
            return Err(Error::ActivationDenied(RESET_REASON.to_string()));
        };

        let result = if state.interruptions == interruptions {
            result
        } else {
            // The OS revoked the session while the request was in flight
            Err(PortError::new(INTERRUPTED_REASON))
        };

        let outcome = match result {
            Ok(()) => {
                state.granted = true;
                if (state.category, state.options) == (category, options) {
                    state.category_dirty = false;
                }
                state.record_outcome(&transition, None);
                info!("Audio session activated for {} (count={})", tenant, state.count);
                if !was_granted {
                    self.events.emit_lossy(SessionEvent::SessionActivated {
                        count: state.count,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Ok(())
            }
            Err(refusal) => {
                state.count = state.count.saturating_sub(transition.joined);
                state.record_outcome(&transition, Some(refusal.reason.clone()));
                warn!(
                    "Audio session activation denied for {}: {} (count={})",
                    tenant, refusal, state.count
                );
                Err(Error::ActivationDenied(refusal.reason))
            }
        };
        drop(state);
        self.changed.notify_all();
        outcome
    }

    /// Release `n` promotions as a single step
    ///
    /// The count is floored at zero. Reaching zero while the host grants the
    /// session asks the port to deactivate; a refusal is reported but the
    /// count stays at zero.
    pub fn demote_by(&self, n: usize) -> Result<()> {
        let mut state = self.lock();
        while matches!(&state.transition, Some(t) if t.kind == TransitionKind::Activating) {
            state = self.wait(state);
        }

        if state.count == 0 || n == 0 {
            debug!("Demote by {} ignored (count={})", n, state.count);
            return Ok(());
        }

        state.count = state.count.saturating_sub(n);
        debug!("Demoted audio session by {} (count={})", n, state.count);
        if state.count > 0 {
            return Ok(());
        }
        if !state.granted {
            debug!("Session not granted; no deactivation needed");
            return Ok(());
        }

        state.granted = false;
        let Ok(port) = self.port.get() else {
            return Ok(());
        };
        let tenant = self.port.tenant().clone();
        let attempt = state.begin(TransitionKind::Deactivating, 0);
        drop(state);

        let result = self.call_port(|| port.set_active(&tenant, false));

        let mut state = self.lock();
        state.finish(attempt);
        drop(state);
        self.changed.notify_all();

        self.events.emit_lossy(SessionEvent::SessionDeactivated {
            deactivated: result.is_ok(),
            timestamp: chrono::Utc::now(),
        });
        match result {
            Ok(()) => {
                info!("Audio session deactivated for {}", tenant);
                Ok(())
            }
            Err(refusal) => {
                warn!("Audio session deactivation refused for {}: {}", tenant, refusal);
                Err(Error::DeactivationRefused(refusal.reason))
            }
        }
    }

    /// Store a new category, pushing it to the host if the session is granted
    ///
    /// While an interruption is in progress, or while nothing holds the
    /// session, the value is only stored; it reaches the host with the next
    /// successful promotion.
    pub fn set_category(&self, category: AudioCategory, options: CategoryOptions) -> Result<()> {
        category::validate(category, options)?;

        let mut state = self.lock();
        while state.transition.is_some() {
            state = self.wait(state);
        }
        state.category = category;
        state.options = options;

        let apply_now = state.granted && state.count > 0 && !state.interrupted;
        if !apply_now {
            state.category_dirty = true;
            drop(state);
            debug!("Deferred audio category {} until next promotion", category);
            self.emit_category(category, options, true);
            return Ok(());
        }

        state.category_dirty = true;
        let epoch = state.epoch;
        drop(state);

        let port = self.port.get()?;
        let result = self.call_port(|| port.set_category(self.port.tenant(), category, options));

        let mut state = self.lock();
        match result {
            Ok(()) => {
                if state.epoch == epoch && (state.category, state.options) == (category, options) {
                    state.category_dirty = false;
                }
                drop(state);
                info!("Applied audio category {}", category);
                self.emit_category(category, options, false);
                Ok(())
            }
            Err(refusal) => {
                drop(state);
                warn!("Host refused audio category {}: {}", category, refusal);
                Err(Error::CategoryRefused(refusal.reason))
            }
        }
    }

    fn emit_category(&self, category: AudioCategory, options: CategoryOptions, deferred: bool) {
        self.events.emit_lossy(SessionEvent::CategoryChanged {
            category,
            options,
            deferred,
            timestamp: chrono::Utc::now(),
        });
    }

    /// The OS revoked the session; the count is left untouched
    ///
    /// An activation still in flight is denied when its port call returns.
    pub fn begin_interruption(&self) {
        let mut state = self.lock();
        state.interrupted = true;
        state.granted = false;
        state.interruptions += 1;
        debug!("Arbiter interrupted (count={})", state.count);
    }

    pub fn end_interruption(&self) {
        self.lock().interrupted = false;
    }

    /// Forget all promotions after the OS audio subsystem restarted
    ///
    /// Any in-flight port call is disowned: its waiters are released with
    /// an activation denial and its eventual result is ignored.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        if let Some(transition) = state.transition.take() {
            if transition.kind == TransitionKind::Activating {
                state.record_outcome(&transition, Some(RESET_REASON.to_string()));
            }
        }
        state.count = 0;
        state.granted = false;
        state.interrupted = false;
        state.category_dirty = true;
        info!("Arbiter reset (epoch {})", state.epoch);
        drop(state);
        self.changed.notify_all();
    }

    /// Push the stored category to the host from scratch
    pub fn reconfigure(&self) -> Result<()> {
        let (category, options) = self.category();
        let port = self.port.get()?;
        self.call_port(|| port.set_category(self.port.tenant(), category, options))
            .map_err(|refusal| Error::CategoryRefused(refusal.reason))?;
        info!("Reconfigured audio session with category {}", category);
        Ok(())
    }

    /// Zero the count and deactivate if granted, ignoring refusal
    pub fn release_all(&self) {
        let mut state = self.lock();
        while state.transition.is_some() {
            state = self.wait(state);
        }
        let was_granted = state.granted;
        state.count = 0;
        state.granted = false;
        drop(state);

        if !was_granted {
            return;
        }
        if let Ok(port) = self.port.get() {
            match self.call_port(|| port.set_active(self.port.tenant(), false)) {
                Ok(()) => info!("Audio session released"),
                Err(refusal) => warn!("Audio session release refused: {}", refusal),
            }
        }
    }
}

/// Clears the port-call mark, also when the port panics
struct PortCallGuard<'a> {
    arbiter: &'a SessionArbiter,
    id: ThreadId,
}

impl Drop for PortCallGuard<'_> {
    fn drop(&mut self) {
        let mut callers = self.arbiter.callers();
        if let Some(position) = callers.iter().position(|id| *id == self.id) {
            callers.swap_remove(position);
        }
    }
}
