//! OS and app-lifecycle signals and the queue that serializes them
//!
//! Signals can arrive on any thread, including from inside a port call or a
//! media object callback made by the coordinator itself. They are appended
//! to one queue; whichever caller finds the queue idle becomes the drainer
//! and processes signals in order until the queue is empty. A signal posted
//! while another caller is draining is left for that drainer. A signal posted
//! from inside a port call is deferred: it waits in the queue until the
//! thread that made the call claims the drain once the call has returned.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// OS interruption notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum InterruptionEvent {
    Began,
    Ended {
        /// OS hint that playback may resume
        #[serde(default)]
        should_resume: bool,
    },
}

/// Notification delivered to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    Interruption(InterruptionEvent),
    MediaServicesReset,
    EnteredBackground,
    EnteredForeground,
    WillDeallocate,
}

impl From<InterruptionEvent> for Signal {
    fn from(event: InterruptionEvent) -> Self {
        Signal::Interruption(event)
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Signal>,
    draining: bool,
}

/// Single-drainer signal queue
#[derive(Default)]
pub(crate) struct SignalQueue {
    state: Mutex<QueueState>,
}

impl SignalQueue {
    /// Append `signal`; returns true when the caller must drain
    pub(crate) fn push(&self, signal: Signal) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.push_back(signal);
        if state.draining {
            false
        } else {
            state.draining = true;
            true
        }
    }

    /// Append `signal` without claiming the drain
    pub(crate) fn defer(&self, signal: Signal) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.push_back(signal);
    }

    /// Become the drainer if signals are pending and nobody is draining
    pub(crate) fn claim(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.draining || state.pending.is_empty() {
            return false;
        }
        state.draining = true;
        true
    }

    /// Next signal for the drainer; `None` ends the drain
    pub(crate) fn next(&self) -> Option<Signal> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let signal = state.pending.pop_front();
        if signal.is_none() {
            state.draining = false;
        }
        signal
    }

    /// Discard everything still queued
    pub(crate) fn discard(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_pusher_drains_in_order() {
        let queue = SignalQueue::default();
        assert!(queue.push(Signal::EnteredBackground));
        assert!(!queue.push(Signal::EnteredForeground));
        assert!(!queue.push(Signal::MediaServicesReset));

        assert_eq!(queue.next(), Some(Signal::EnteredBackground));
        assert_eq!(queue.next(), Some(Signal::EnteredForeground));
        assert_eq!(queue.next(), Some(Signal::MediaServicesReset));
        assert_eq!(queue.next(), None);

        // Idle again: the next pusher drains
        assert!(queue.push(Signal::WillDeallocate));
    }

    #[test]
    fn test_deferred_signals_wait_for_claim() {
        let queue = SignalQueue::default();
        assert!(!queue.claim());

        queue.defer(Signal::EnteredBackground);
        queue.defer(Signal::EnteredForeground);
        assert!(queue.claim());
        assert!(!queue.claim(), "only one drainer at a time");
        assert!(!queue.push(Signal::WillDeallocate));

        assert_eq!(queue.next(), Some(Signal::EnteredBackground));
        assert_eq!(queue.next(), Some(Signal::EnteredForeground));
        assert_eq!(queue.next(), Some(Signal::WillDeallocate));
        assert_eq!(queue.next(), None);
        assert!(!queue.claim());
    }

    #[test]
    fn test_signal_serialization() {
        let signal: Signal = InterruptionEvent::Ended { should_resume: true }.into();
        let json = serde_json::to_value(signal).unwrap();
        assert_eq!(json["signal"], "interruption");
        assert_eq!(json["phase"], "ended");
        assert_eq!(json["should_resume"], true);
    }
}
