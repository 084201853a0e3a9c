//! Lifecycle bridge
//!
//! Translates app foreground/background transitions into pauses, resumes and
//! promotion changes. Whether audio focus is released in the background is
//! host policy, passed in as `stays_active_in_background`.

use crate::context::SessionContext;
use avs_common::events::ErrorOrigin;
use avs_common::{ActivityState, MediaHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct BridgeState {
    backgrounded: bool,
    torn_down: bool,
    /// Objects paused on entering the background
    snapshot: Vec<MediaHandle>,
}

pub(crate) struct LifecycleBridge {
    stays_active_in_background: AtomicBool,
    state: Mutex<BridgeState>,
}

impl LifecycleBridge {
    pub(crate) fn new(stays_active_in_background: bool) -> Self {
        Self {
            stays_active_in_background: AtomicBool::new(stays_active_in_background),
            state: Mutex::new(BridgeState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_stays_active_in_background(&self, value: bool) {
        self.stays_active_in_background.store(value, Ordering::SeqCst);
    }

    pub(crate) fn stays_active_in_background(&self) -> bool {
        self.stays_active_in_background.load(Ordering::SeqCst)
    }

    pub(crate) fn is_backgrounded(&self) -> bool {
        self.lock().backgrounded
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }

    /// Mark teardown; returns false if it already happened
    pub(crate) fn begin_teardown(&self) -> bool {
        let mut state = self.lock();
        if state.torn_down {
            return false;
        }
        state.torn_down = true;
        state.snapshot.clear();
        true
    }

    pub(crate) fn reset(&self) {
        self.lock().snapshot.clear();
    }

    /// Track objects paused elsewhere so they resume with the foreground
    pub(crate) fn adopt(&self, handles: &[MediaHandle]) {
        let mut state = self.lock();
        for handle in handles {
            if !state.snapshot.contains(handle) {
                state.snapshot.push(*handle);
            }
        }
    }

    /// Stop tracking `handles`; they will not resume with the foreground
    pub(crate) fn release(&self, handles: &[MediaHandle]) {
        self.lock().snapshot.retain(|handle| !handles.contains(handle));
    }

    pub(crate) fn entered_background(&self, ctx: &SessionContext) {
        {
            let mut state = self.lock();
            if state.backgrounded {
                debug!("Already in background");
                return;
            }
            state.backgrounded = true;
        }

        if let Ok(port) = ctx.port.get() {
            port.did_background(ctx.port.tenant());
        }

        let release_focus = !self.stays_active_in_background();
        let paused = ctx.pause_where(
            |object| release_focus || !object.supports_background_playback(),
            ActivityState::PausedByBackground,
            ErrorOrigin::Lifecycle,
        );
        info!(
            "Entered background; paused {} objects (release focus: {})",
            paused.len(),
            release_focus
        );
        self.lock().snapshot = paused;
    }

    /// Foreground transition
    ///
    /// Returns the background snapshot instead of resuming it when
    /// `interrupted` is set, so the caller can fold it into the interruption.
    pub(crate) fn entered_foreground(
        &self,
        ctx: &SessionContext,
        interrupted: bool,
    ) -> Vec<MediaHandle> {
        let snapshot = {
            let mut state = self.lock();
            if !state.backgrounded {
                debug!("Already in foreground");
                return Vec::new();
            }
            state.backgrounded = false;
            std::mem::take(&mut state.snapshot)
        };

        if let Ok(port) = ctx.port.get() {
            port.did_foreground(ctx.port.tenant());
        }

        if interrupted {
            info!(
                "Entered foreground during interruption; deferring {} objects",
                snapshot.len()
            );
            return snapshot;
        }

        match ctx.resume(&snapshot, ActivityState::PausedByBackground) {
            Ok(resumed) => info!("Entered foreground; resumed {} objects", resumed.len()),
            Err(e) => ctx.report(ErrorOrigin::Lifecycle, &e),
        }
        Vec::new()
    }
}
