// Session fixation protection
// Decides what happens to the session identifier at the moment of
// authentication, so an identifier seeded by an attacker before login is
// never carried into the authenticated session.

use crate::error::SessionError;
use crate::events::{EventBus, SessionEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Attribute bag held by a host session.
pub type SessionAttributes = HashMap<String, serde_json::Value>;

/// How the session identifier is handled at authentication time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixationPolicy {
    /// Keep the original identifier. Leaves the deployment open to
    /// fixation attacks; only for hosts that manage this themselves.
    None,
    /// Allocate a fresh identifier and discard all prior attributes
    /// except the configured reserved set.
    NewSession,
    /// Allocate a fresh identifier and copy every prior attribute into
    /// the new session.
    MigrateSession,
    /// Rotate the identifier in place without touching attributes.
    /// Requires host support.
    #[default]
    ChangeSessionId,
}

/// Boundary to the hosting environment's session for one request.
///
/// The core never stores session attributes itself; it only instructs the
/// host what to do with them at authentication time.
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Identifier of the current session, if one exists.
    async fn current_session_id(&self) -> Option<String>;

    /// Snapshot of the attributes held in the current session. Empty if
    /// no session exists.
    async fn attributes(&self) -> SessionAttributes;

    /// Invalidate the current session (if any) and start a fresh one
    /// holding exactly `attributes`. Returns the new identifier.
    async fn replace_session(
        &self,
        attributes: SessionAttributes,
    ) -> Result<String, SessionError>;

    /// Rotate the current session's identifier in place, keeping every
    /// attribute. Returns the new identifier, or
    /// [`SessionError::UnsupportedBySessionHost`] if the host cannot do
    /// this.
    async fn change_session_id(&self) -> Result<String, SessionError>;

    /// Whether [`SessionHost::change_session_id`] is available. Used for
    /// fail-fast validation at startup.
    fn supports_change_session_id(&self) -> bool {
        true
    }
}

/// Applies the configured fixation policy once per successful
/// authentication, before concurrency control runs.
pub struct SessionFixationGuard {
    policy: FixationPolicy,
    reserved_attributes: Vec<String>,
    events: EventBus,
}

impl SessionFixationGuard {
    pub fn new(policy: FixationPolicy, reserved_attributes: Vec<String>, events: EventBus) -> Self {
        Self {
            policy,
            reserved_attributes,
            events,
        }
    }

    /// Fail fast when the configured policy cannot work against the given
    /// host. Call this at startup so a `change_session_id` deployment on
    /// a host without in-place rotation does not fail on the first login.
    pub fn validate_host(&self, host: &dyn SessionHost) -> Result<(), SessionError> {
        if self.policy == FixationPolicy::ChangeSessionId && !host.supports_change_session_id() {
            return Err(SessionError::UnsupportedBySessionHost);
        }
        Ok(())
    }

    /// Apply the policy to the pre-authentication session.
    ///
    /// Returns the identifier the authenticated session will run under,
    /// or `None` when no session existed and the policy did not create
    /// one (the caller allocates one before registration). Publishes
    /// [`SessionEvent::FixationProtectionApplied`] whenever an existing
    /// identifier was actually rotated.
    pub async fn apply(&self, host: &dyn SessionHost) -> Result<Option<String>, SessionError> {
        let old_id = host.current_session_id().await;

        let Some(old_id) = old_id else {
            debug!("No pre-authentication session present, fixation protection not applicable");
            return Ok(None);
        };

        let new_id = match self.policy {
            FixationPolicy::None => return Ok(Some(old_id)),
            FixationPolicy::NewSession => {
                let attributes = host.attributes().await;
                let kept: SessionAttributes = attributes
                    .into_iter()
                    .filter(|(key, _)| self.reserved_attributes.iter().any(|r| r == key))
                    .collect();
                host.replace_session(kept).await?
            }
            FixationPolicy::MigrateSession => {
                let attributes = host.attributes().await;
                host.replace_session(attributes).await?
            }
            FixationPolicy::ChangeSessionId => {
                if !host.supports_change_session_id() {
                    return Err(SessionError::UnsupportedBySessionHost);
                }
                host.change_session_id().await?
            }
        };

        info!(
            "Fixation protection ({:?}) rotated session {} -> {}",
            self.policy, old_id, new_id
        );
        self.events.publish(&SessionEvent::FixationProtectionApplied {
            old_session_id: old_id,
            new_session_id: new_id.clone(),
        });

        Ok(Some(new_id))
    }
}

struct HostSession {
    id: String,
    attributes: SessionAttributes,
}

/// In-process session host.
///
/// One instance models the session belonging to one client. Embedders
/// without a container-managed session layer can use it directly; it is
/// also the host the tests run against.
pub struct InMemorySessionHost {
    session: RwLock<Option<HostSession>>,
    rotation_supported: bool,
}

impl InMemorySessionHost {
    /// Host with no current session.
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
            rotation_supported: true,
        }
    }

    /// Host with an existing session carrying `attributes`.
    pub fn with_session(attributes: SessionAttributes) -> Self {
        Self {
            session: RwLock::new(Some(HostSession {
                id: Uuid::new_v4().to_string(),
                attributes,
            })),
            rotation_supported: true,
        }
    }

    /// Disable in-place rotation, mimicking a legacy host.
    pub fn without_rotation_support(mut self) -> Self {
        self.rotation_supported = false;
        self
    }
}

impl Default for InMemorySessionHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionHost for InMemorySessionHost {
    async fn current_session_id(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.id.clone())
    }

    async fn attributes(&self) -> SessionAttributes {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.attributes.clone())
            .unwrap_or_default()
    }

    async fn replace_session(
        &self,
        attributes: SessionAttributes,
    ) -> Result<String, SessionError> {
        let mut session = self.session.write().await;
        let id = Uuid::new_v4().to_string();
        *session = Some(HostSession {
            id: id.clone(),
            attributes,
        });
        Ok(id)
    }

    async fn change_session_id(&self) -> Result<String, SessionError> {
        if !self.rotation_supported {
            return Err(SessionError::UnsupportedBySessionHost);
        }
        let mut session = self.session.write().await;
        match session.as_mut() {
            Some(current) => {
                current.id = Uuid::new_v4().to_string();
                Ok(current.id.clone())
            }
            // Rotation with no session behaves like starting a fresh one.
            None => {
                let id = Uuid::new_v4().to_string();
                *session = Some(HostSession {
                    id: id.clone(),
                    attributes: SessionAttributes::new(),
                });
                Ok(id)
            }
        }
    }

    fn supports_change_session_id(&self) -> bool {
        self.rotation_supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEventListener;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn attrs(pairs: &[(&str, &str)]) -> SessionAttributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<SessionEvent>>,
    }

    impl SessionEventListener for Recorder {
        fn on_event(&self, event: &SessionEvent) {
            self.seen.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test]
    async fn test_none_policy_keeps_identifier() {
        let host = InMemorySessionHost::with_session(attrs(&[("theme", "dark")]));
        let old_id = host.current_session_id().await.unwrap();

        let guard = SessionFixationGuard::new(FixationPolicy::None, vec![], EventBus::new());
        let id = guard.apply(&host).await.unwrap();

        assert_eq!(id, Some(old_id));
    }

    #[tokio::test]
    async fn test_new_session_keeps_only_reserved_attributes() {
        let host = InMemorySessionHost::with_session(attrs(&[
            ("csrf_token", "abc"),
            ("cart", "3 items"),
        ]));
        let old_id = host.current_session_id().await.unwrap();

        let guard = SessionFixationGuard::new(
            FixationPolicy::NewSession,
            vec!["csrf_token".to_string()],
            EventBus::new(),
        );
        let new_id = guard.apply(&host).await.unwrap().unwrap();

        assert_ne!(new_id, old_id);
        let remaining = host.attributes().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.get("csrf_token"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_migrate_session_preserves_every_attribute() {
        let original = attrs(&[("theme", "dark"), ("cart", "3 items"), ("locale", "en")]);
        let host = InMemorySessionHost::with_session(original.clone());
        let old_id = host.current_session_id().await.unwrap();

        let guard =
            SessionFixationGuard::new(FixationPolicy::MigrateSession, vec![], EventBus::new());
        let new_id = guard.apply(&host).await.unwrap().unwrap();

        assert_ne!(new_id, old_id);
        assert_eq!(host.attributes().await, original);
    }

    #[tokio::test]
    async fn test_change_session_id_mutates_in_place() {
        let original = attrs(&[("theme", "dark")]);
        let host = InMemorySessionHost::with_session(original.clone());
        let old_id = host.current_session_id().await.unwrap();

        let guard =
            SessionFixationGuard::new(FixationPolicy::ChangeSessionId, vec![], EventBus::new());
        let new_id = guard.apply(&host).await.unwrap().unwrap();

        assert_ne!(new_id, old_id);
        assert_eq!(host.current_session_id().await, Some(new_id));
        assert_eq!(host.attributes().await, original);
    }

    #[tokio::test]
    async fn test_change_session_id_unsupported_host() {
        let host =
            InMemorySessionHost::with_session(SessionAttributes::new()).without_rotation_support();

        let guard =
            SessionFixationGuard::new(FixationPolicy::ChangeSessionId, vec![], EventBus::new());

        assert!(matches!(
            guard.validate_host(&host),
            Err(SessionError::UnsupportedBySessionHost)
        ));
        assert!(matches!(
            guard.apply(&host).await,
            Err(SessionError::UnsupportedBySessionHost)
        ));
    }

    #[tokio::test]
    async fn test_rotation_publishes_event() {
        let events = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        events.subscribe(recorder.clone());

        let host = InMemorySessionHost::with_session(SessionAttributes::new());
        let old_id = host.current_session_id().await.unwrap();

        let guard =
            SessionFixationGuard::new(FixationPolicy::MigrateSession, vec![], events.clone());
        let new_id = guard.apply(&host).await.unwrap().unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[SessionEvent::FixationProtectionApplied {
                old_session_id: old_id,
                new_session_id: new_id,
            }]
        );
    }

    #[tokio::test]
    async fn test_no_prior_session_means_no_rotation_and_no_event() {
        let events = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        events.subscribe(recorder.clone());

        let host = InMemorySessionHost::new();
        let guard =
            SessionFixationGuard::new(FixationPolicy::MigrateSession, vec![], events.clone());

        assert_eq!(guard.apply(&host).await.unwrap(), None);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
