// Post-authentication pipeline
// Runs exactly once per successful authentication: fixation protection,
// registration, concurrency control, then any extra configured strategies.

use super::concurrency::ConcurrencyLimiter;
use super::fixation::{SessionAttributes, SessionFixationGuard, SessionHost};
use crate::config::SessionControlConfig;
use crate::error::SessionError;
use crate::events::EventBus;
use crate::session::{Principal, SessionRecord, SessionRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// An additional post-authentication step appended after the built-in
/// pipeline. A failure aborts the login and rolls back the fresh
/// registration.
#[async_trait]
pub trait PostAuthStrategy: Send + Sync {
    async fn on_authentication(
        &self,
        principal: &Principal,
        session_id: &str,
        registry: &SessionRegistry,
    ) -> Result<(), SessionError>;
}

/// Composes fixation protection and concurrency control into one ordered
/// pipeline with atomic-per-login semantics.
///
/// The whole pipeline for a principal runs under that principal's login
/// lock, closing the check-then-act window between registering a session
/// and counting sessions: two simultaneous logins for the same principal
/// can never both observe a stale count and slip past the limiter.
pub struct SessionAuthenticationOrchestrator {
    registry: Arc<SessionRegistry>,
    fixation: SessionFixationGuard,
    limiter: ConcurrencyLimiter,
    strategies: Vec<Arc<dyn PostAuthStrategy>>,
    // One lock per principal, created on first login and retained for the
    // orchestrator's lifetime.
    login_locks: Mutex<HashMap<Principal, Arc<Mutex<()>>>>,
}

impl SessionAuthenticationOrchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        config: &SessionControlConfig,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            fixation: SessionFixationGuard::new(
                config.fixation_protection,
                config.reserved_attributes.clone(),
                events,
            ),
            limiter: ConcurrencyLimiter::new(
                config.max_sessions,
                config.max_sessions_prevents_login,
            ),
            strategies: Vec::new(),
            login_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Append an extra strategy to the end of the pipeline.
    pub fn with_strategy(mut self, strategy: Arc<dyn PostAuthStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Fail fast when the configured fixation policy cannot work against
    /// the host in use.
    pub fn validate_host(&self, host: &dyn SessionHost) -> Result<(), SessionError> {
        self.fixation.validate_host(host)
    }

    /// Process one successful authentication event.
    ///
    /// Never call this for anonymous requests. On any stage failure the
    /// fresh registration is rolled back before the error is surfaced, so
    /// a denied login leaves no trace in the registry.
    pub async fn on_authentication_success(
        &self,
        principal: Principal,
        host: &dyn SessionHost,
    ) -> Result<SessionRecord, SessionError> {
        let login_lock = {
            let mut locks = self.login_locks.lock().await;
            locks
                .entry(principal.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = login_lock.lock().await;

        let session_id = match self.fixation.apply(host).await? {
            Some(id) => id,
            // No pre-authentication session existed; have the host start
            // one so the login has an identifier to run under.
            None => host.replace_session(SessionAttributes::new()).await?,
        };

        let record = self
            .registry
            .register_new_session(&session_id, principal.clone())
            .await?;

        if let Err(e) = self
            .limiter
            .enforce(&self.registry, &principal, &session_id)
            .await
        {
            self.rollback(&session_id, &principal).await;
            return Err(e);
        }

        for strategy in &self.strategies {
            if let Err(e) = strategy
                .on_authentication(&principal, &session_id, &self.registry)
                .await
            {
                self.rollback(&session_id, &principal).await;
                return Err(e);
            }
        }

        info!(
            "Authentication pipeline completed for principal {} on session {}",
            principal, session_id
        );
        Ok(record)
    }

    async fn rollback(&self, session_id: &str, principal: &Principal) {
        warn!(
            "Rolling back session {} for principal {}: login denied",
            session_id, principal
        );
        self.registry.remove_session_record(session_id).await;
    }
}
