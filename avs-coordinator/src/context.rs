//! Shared registry/arbiter context used by the signal handlers
//!
//! Pausing and resuming groups of objects is the same operation whether an
//! interruption or a lifecycle transition triggers it, so both handlers go
//! through these helpers. Object callbacks always run with the registry lock
//! released.

use crate::error::{Error, Result};
use crate::port::PortBinding;
use crate::registry::{EntryStatus, MediaObject, Registry};
use crate::session::SessionArbiter;
use avs_common::events::{ErrorOrigin, EventBus, SessionEvent};
use avs_common::{ActivityState, MediaHandle};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub(crate) struct SessionContext {
    pub(crate) registry: Mutex<Registry>,
    pub(crate) arbiter: SessionArbiter,
    pub(crate) port: Arc<PortBinding>,
    pub(crate) events: EventBus,
}

impl SessionContext {
    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn report(&self, origin: ErrorOrigin, err: &Error) {
        warn!("{:?} failure: {}", origin, err);
        self.events.emit_lossy(SessionEvent::error(origin, err.to_string()));
    }

    pub(crate) fn emit_transition(&self, handle: MediaHandle, old_state: ActivityState, new_state: ActivityState) {
        if old_state != new_state {
            self.events
                .emit_lossy(SessionEvent::activity(handle, old_state, new_state));
        }
    }

    /// Move the objects in `handles` still in `from` to `to`
    ///
    /// Promotions are untouched; only paused states are retagged.
    pub(crate) fn retag(
        &self,
        handles: &[MediaHandle],
        from: ActivityState,
        to: ActivityState,
    ) -> Vec<MediaHandle> {
        let mut moved = Vec::new();
        {
            let mut registry = self.registry();
            for handle in handles {
                let Some(status) = registry.status(*handle) else {
                    continue;
                };
                if status.state != from {
                    continue;
                }
                let status = EntryStatus { state: to, ..status };
                if registry.set_status(*handle, status).is_ok() {
                    moved.push(*handle);
                }
            }
        }
        for handle in &moved {
            self.emit_transition(*handle, from, to);
        }
        moved
    }

    /// Release promotions held by objects that were destroyed
    pub(crate) fn collect_garbage(&self, origin: ErrorOrigin) {
        let released = self.registry().prune();
        if released > 0 {
            debug!("Releasing {} promotions held by destroyed objects", released);
            if let Err(e) = self.arbiter.demote_by(released) {
                self.report(origin, &e);
            }
        }
    }

    /// Pause every active object accepted by `filter`
    ///
    /// Paused objects move to `paused_state` and their promotions are
    /// released in one step. Returns the handles that were paused.
    pub(crate) fn pause_where<F>(
        &self,
        filter: F,
        paused_state: ActivityState,
        origin: ErrorOrigin,
    ) -> Vec<MediaHandle>
    where
        F: Fn(&dyn MediaObject) -> bool,
    {
        self.collect_garbage(origin);

        let mut active = Vec::new();
        self.registry()
            .for_each_active(|handle, object| active.push((handle, Arc::clone(object))));
        active.retain(|(_, object)| filter(object.as_ref()));

        let mut targets = Vec::new();
        let mut released = 0;
        {
            let mut registry = self.registry();
            for (handle, object) in active {
                if registry.status(handle).map(|s| s.state) != Some(ActivityState::Active) {
                    continue;
                }
                let status = EntryStatus {
                    state: paused_state,
                    holds_promotion: false,
                };
                if let Ok(previous) = registry.set_status(handle, status) {
                    if previous.holds_promotion {
                        released += 1;
                    }
                    targets.push((handle, object));
                }
            }
        }

        if released > 0 {
            if let Err(e) = self.arbiter.demote_by(released) {
                self.report(origin, &e);
            }
        }

        targets
            .into_iter()
            .map(|(handle, object)| {
                object.pause();
                self.emit_transition(handle, ActivityState::Active, paused_state);
                handle
            })
            .collect()
    }

    /// Re-promote and resume the objects in `handles` still in `from_state`
    ///
    /// Promotion happens before any object is told to resume. On failure
    /// nothing is resumed and the objects keep `from_state`.
    pub(crate) fn resume(
        &self,
        handles: &[MediaHandle],
        from_state: ActivityState,
    ) -> Result<Vec<MediaHandle>> {
        let eligible = {
            let registry = self.registry();
            handles
                .iter()
                .copied()
                .filter(|handle| {
                    registry.get(*handle).is_some()
                        && registry.status(*handle).map(|s| s.state) == Some(from_state)
                })
                .count()
        };

        if eligible == 0 && self.arbiter.count() == 0 {
            return Ok(Vec::new());
        }
        self.arbiter.promote_by(eligible)?;

        let mut resumed = Vec::new();
        let mut surplus = eligible;
        {
            let mut registry = self.registry();
            for handle in handles {
                if surplus == 0 {
                    break;
                }
                let Some(object) = registry.get(*handle) else {
                    continue;
                };
                if registry.status(*handle).map(|s| s.state) != Some(from_state) {
                    continue;
                }
                let status = EntryStatus {
                    state: ActivityState::Active,
                    holds_promotion: true,
                };
                if registry.set_status(*handle, status).is_ok() {
                    surplus -= 1;
                    resumed.push((*handle, object));
                }
            }
        }

        // Objects that changed state between counting and marking
        if surplus > 0 {
            if let Err(e) = self.arbiter.demote_by(surplus) {
                self.report(ErrorOrigin::Arbiter, &e);
            }
        }

        Ok(resumed
            .into_iter()
            .map(|(handle, object)| {
                object.resume();
                self.emit_transition(handle, from_state, ActivityState::Active);
                handle
            })
            .collect())
    }
}
