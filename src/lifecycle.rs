// Host session-lifecycle boundary
// Receives created/destroyed notifications from the hosting environment
// and keeps the registry in sync.

use crate::events::{EventBus, SessionEvent};
use crate::session::SessionRegistry;
use std::sync::Arc;
use tracing::{debug, info};

/// Forwards host session-lifecycle notifications into the registry.
///
/// Notifications are fire-and-forget pushes from the host; nothing here
/// fails back to the caller.
pub struct SessionLifecycleNotifier {
    registry: Arc<SessionRegistry>,
    events: EventBus,
}

impl SessionLifecycleNotifier {
    pub fn new(registry: Arc<SessionRegistry>, events: EventBus) -> Self {
        Self { registry, events }
    }

    /// The host created a session. Nothing is registered here: a record
    /// only enters the registry at authentication time, so anonymous
    /// sessions are never tracked.
    pub async fn on_session_created(&self, session_id: &str) {
        debug!("Host created session {}", session_id);
    }

    /// The host destroyed a session; drop its record (expired or not)
    /// and tell listeners.
    pub async fn on_session_destroyed(&self, session_id: &str) {
        info!("Host destroyed session {}", session_id);
        self.registry.remove_session_record(session_id).await;
        self.events.publish(&SessionEvent::SessionDestroyed {
            session_id: session_id.to_string(),
        });
    }
}
