//! Event types for the AVS event system
//!
//! Provides shared event definitions and the EventBus used by the coordinator
//! to publish activity changes and error notifications to listeners.

mod category_types;
mod session_types;

pub use category_types::{AudioCategory, BitRateStrategy, CategoryOptions, InterruptionMode};
pub use session_types::{ActivityState, ErrorOrigin, InterruptionPhase, MediaHandle};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Coordinator event types
///
/// Events are broadcast via EventBus and serialize to tagged JSON objects.
/// OS-driven operations have no caller to return an error to, so their
/// failures are published here as `Error` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A media object's activity state changed
    ///
    /// Triggers:
    /// - UI: reflect paused/resumed state for the object
    ActivityChanged {
        /// Object whose state changed
        handle: MediaHandle,
        /// State before the change
        old_state: ActivityState,
        /// State after the change
        new_state: ActivityState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The host granted session activation (count left zero)
    SessionActivated {
        /// Promotion count after activation
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The last promotion was released
    SessionDeactivated {
        /// False when the host refused to deactivate
        deactivated: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Stored category or options changed
    CategoryChanged {
        category: AudioCategory,
        options: CategoryOptions,
        /// True when the new value waits for the next promotion
        deferred: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The OS interrupted the session
    InterruptionBegan {
        /// Objects paused by the interruption
        paused: Vec<MediaHandle>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The OS ended an interruption
    InterruptionEnded {
        /// Resume hint delivered with the end event
        should_resume: bool,
        /// Objects resumed by the coordinator
        resumed: Vec<MediaHandle>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The OS audio subsystem restarted
    MediaServicesReset {
        /// Objects told to reinitialize
        reinitialized: Vec<MediaHandle>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A failure with no direct caller to return it to
    Error {
        /// Component that observed the failure
        origin: ErrorOrigin,
        /// Human-readable description
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SessionEvent {
    /// Build an `Error` event stamped with the current time
    pub fn error(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        SessionEvent::Error {
            origin,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Build an `ActivityChanged` event stamped with the current time
    pub fn activity(handle: MediaHandle, old_state: ActivityState, new_state: ActivityState) -> Self {
        SessionEvent::ActivityChanged {
            handle,
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Publishing never requires a runtime, so the coordinator can emit from
/// whatever thread delivered the OS notification.
///
/// # Examples
///
/// ```
/// use avs_common::events::{ErrorOrigin, EventBus, SessionEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SessionEvent::error(ErrorOrigin::Arbiter, "denied"));
/// assert!(matches!(rx.try_recv(), Ok(SessionEvent::Error { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are
    /// dropped for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
