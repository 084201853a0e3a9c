//! Interruption handler
//!
//! State machine reacting to OS interruption and media-services-reset
//! signals:
//!
//! ```text
//!   Normal --began--> Interrupted --ended(resume ok)--> Normal
//!                          |
//!                          +--ended(no resume)--> Normal (objects stay paused)
//!                          +--ended(resume denied)--> Interrupted, empty snapshot
//!   any --media services reset--> Normal
//! ```
//!
//! Only objects that were active when the interruption began are resumed;
//! anything the user paused beforehand stays paused.

use crate::context::SessionContext;
use avs_common::events::{ErrorOrigin, InterruptionPhase, SessionEvent};
use avs_common::{ActivityState, MediaHandle};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Handler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionState {
    Normal,
    Interrupted,
}

#[derive(Debug)]
struct Machine {
    state: InterruptionState,
    phase: InterruptionPhase,
    /// Objects paused by the current interruption, resumed at its end
    snapshot: Vec<MediaHandle>,
}

pub(crate) struct InterruptionHandler {
    machine: Mutex<Machine>,
}

impl Default for InterruptionHandler {
    fn default() -> Self {
        Self {
            machine: Mutex::new(Machine {
                state: InterruptionState::Normal,
                phase: InterruptionPhase::None,
                snapshot: Vec::new(),
            }),
        }
    }
}

impl InterruptionHandler {
    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> InterruptionState {
        self.lock().state
    }

    pub(crate) fn phase(&self) -> InterruptionPhase {
        self.lock().phase
    }

    pub(crate) fn snapshot(&self) -> Vec<MediaHandle> {
        self.lock().snapshot.clone()
    }

    /// Track objects paused elsewhere so they resume with this interruption
    pub(crate) fn adopt(&self, handles: &[MediaHandle]) {
        let mut machine = self.lock();
        for handle in handles {
            if !machine.snapshot.contains(handle) {
                machine.snapshot.push(*handle);
            }
        }
    }

    pub(crate) fn began(&self, ctx: &SessionContext) {
        ctx.arbiter.begin_interruption();
        let paused = ctx.pause_where(
            |_| true,
            ActivityState::PausedByInterruption,
            ErrorOrigin::Interruption,
        );

        {
            let mut machine = self.lock();
            if machine.state == InterruptionState::Interrupted {
                debug!("Interruption began while already interrupted");
            }
            machine.state = InterruptionState::Interrupted;
            machine.phase = InterruptionPhase::Began;
            for handle in &paused {
                if !machine.snapshot.contains(handle) {
                    machine.snapshot.push(*handle);
                }
            }
        }

        info!("Audio session interrupted; paused {} objects", paused.len());
        ctx.events.emit_lossy(SessionEvent::InterruptionBegan {
            paused,
            timestamp: chrono::Utc::now(),
        });
    }

    pub(crate) fn ended(&self, ctx: &SessionContext, should_resume: bool) {
        let snapshot = {
            let mut machine = self.lock();
            if machine.state == InterruptionState::Normal {
                debug!("Interruption ended while not interrupted; ignoring");
                return;
            }
            machine.phase = InterruptionPhase::Ended;
            std::mem::take(&mut machine.snapshot)
        };
        ctx.arbiter.end_interruption();

        if !should_resume {
            self.lock().state = InterruptionState::Normal;
            info!(
                "Interruption ended without resume hint; {} objects stay paused",
                snapshot.len()
            );
            ctx.events.emit_lossy(SessionEvent::InterruptionEnded {
                should_resume,
                resumed: Vec::new(),
                timestamp: chrono::Utc::now(),
            });
            return;
        }

        match ctx.resume(&snapshot, ActivityState::PausedByInterruption) {
            Ok(resumed) => {
                self.lock().state = InterruptionState::Normal;
                info!("Interruption ended; resumed {} objects", resumed.len());
                ctx.events.emit_lossy(SessionEvent::InterruptionEnded {
                    should_resume,
                    resumed,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                // Snapshot already taken: stay interrupted with nothing to resume
                warn!("Could not resume after interruption: {}", e);
                ctx.report(ErrorOrigin::Interruption, &e);
            }
        }
    }

    /// Stop tracking `handles`; they will not resume with this interruption
    pub(crate) fn release(&self, handles: &[MediaHandle]) {
        self.lock().snapshot.retain(|handle| !handles.contains(handle));
    }

    /// Forget the interruption after the OS audio subsystem restarted
    pub(crate) fn reset(&self) {
        let mut machine = self.lock();
        machine.state = InterruptionState::Normal;
        machine.phase = InterruptionPhase::None;
        machine.snapshot.clear();
    }
}
