// Session event publication
// Explicit message emission to registered listeners; nothing in the core
// reacts to these events itself.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Events published by the session-control core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SessionEvent {
    /// Fixation protection rotated a session identifier at
    /// authentication time.
    FixationProtectionApplied {
        old_session_id: String,
        new_session_id: String,
    },
    /// The hosting environment destroyed a session and its record was
    /// dropped from the registry.
    SessionDestroyed { session_id: String },
}

/// Receives published session events. Implementations must not block;
/// publication happens inline on the publishing task.
pub trait SessionEventListener: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Fan-out of session events to registered listeners.
///
/// Cloning is cheap; clones share the same listener set. Publication is
/// synchronous fire-and-forget, so a `std` lock is enough — no listener
/// call ever awaits.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn SessionEventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for all subsequently published events.
    pub fn subscribe(&self, listener: Arc<dyn SessionEventListener>) {
        self.listeners
            .write()
            .expect("event listener lock poisoned")
            .push(listener);
    }

    /// Deliver an event to every registered listener, in subscription
    /// order.
    pub fn publish(&self, event: &SessionEvent) {
        debug!("Publishing session event: {:?}", event);
        let listeners = self
            .listeners
            .read()
            .expect("event listener lock poisoned");
        for listener in listeners.iter() {
            listener.on_event(event);
        }
    }
}
