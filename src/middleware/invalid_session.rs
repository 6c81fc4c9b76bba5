// Invalid- and expired-session detection
// Runs once per request, before authentication-state checks, and decides
// whether the request proceeds or is diverted to a recovery action.

use crate::config::SessionControlConfig;
use crate::session::{SessionRecord, SessionRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// What the transport layer tells this core about an incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Session identifier the client presented, if any.
    pub session_id: Option<String>,
    /// Whether a valid security context is already established for the
    /// request.
    pub authenticated: bool,
    /// Whether the client is interactive (a browser that can follow a
    /// redirect) as opposed to an API caller.
    pub interactive: bool,
}

impl RequestContext {
    /// A fresh request with no session reference.
    pub fn anonymous() -> Self {
        Self {
            session_id: None,
            authenticated: false,
            interactive: true,
        }
    }

    /// An unauthenticated request presenting `session_id`.
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            authenticated: false,
            interactive: true,
        }
    }
}

/// How a diverted request should be answered by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Send the client to this location.
    Redirect(String),
    /// Answer with an unauthorized status.
    Unauthorized,
}

/// Outcome of inspecting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDisposition {
    /// Nothing wrong with the session reference; continue through the
    /// filter chain towards authentication checks.
    Continue,
    /// The request was diverted; stop processing it through this layer.
    Recovered(RecoveryAction),
}

/// Recovery for a request bearing a session id this core does not know.
/// Whether the session timed out or never existed is not distinguished.
#[async_trait]
pub trait InvalidSessionStrategy: Send + Sync {
    async fn on_invalid_session(&self, request: &RequestContext) -> RecoveryAction;
}

/// Default invalid-session recovery: redirect to a fixed location.
pub struct RedirectInvalidSessionStrategy {
    url: String,
}

impl RedirectInvalidSessionStrategy {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl InvalidSessionStrategy for RedirectInvalidSessionStrategy {
    async fn on_invalid_session(&self, _request: &RequestContext) -> RecoveryAction {
        RecoveryAction::Redirect(self.url.clone())
    }
}

/// Recovery for a request whose session was expired by the concurrency
/// limiter, invoked the next time that session is used.
#[async_trait]
pub trait ExpiredSessionStrategy: Send + Sync {
    async fn on_expired(
        &self,
        request: &RequestContext,
        record: &SessionRecord,
    ) -> RecoveryAction;
}

/// Default expired-session recovery: redirect interactive clients when a
/// URL is configured, otherwise answer unauthorized.
pub struct DefaultExpiredSessionStrategy {
    redirect_url: Option<String>,
}

impl DefaultExpiredSessionStrategy {
    pub fn new(redirect_url: Option<String>) -> Self {
        Self { redirect_url }
    }
}

#[async_trait]
impl ExpiredSessionStrategy for DefaultExpiredSessionStrategy {
    async fn on_expired(
        &self,
        request: &RequestContext,
        record: &SessionRecord,
    ) -> RecoveryAction {
        info!(
            "Session {} for principal {} was expired{}",
            record.session_id,
            record.principal,
            record
                .expiry_reason()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        );
        match &self.redirect_url {
            Some(url) if request.interactive => RecoveryAction::Redirect(url.clone()),
            _ => RecoveryAction::Unauthorized,
        }
    }
}

/// Detects dangling or expired session references on incoming requests.
pub struct InvalidSessionDetector {
    registry: Arc<SessionRegistry>,
    invalid_strategy: Option<Arc<dyn InvalidSessionStrategy>>,
    expired_strategy: Arc<dyn ExpiredSessionStrategy>,
}

impl InvalidSessionDetector {
    /// Detector with the default strategies implied by `config`: the
    /// invalid-session check is active only when `invalid_session_url` is
    /// set, matching the configuration surface.
    pub fn from_config(registry: Arc<SessionRegistry>, config: &SessionControlConfig) -> Self {
        Self {
            registry,
            invalid_strategy: config
                .invalid_session_url
                .as_ref()
                .map(|url| {
                    Arc::new(RedirectInvalidSessionStrategy::new(url.clone()))
                        as Arc<dyn InvalidSessionStrategy>
                }),
            expired_strategy: Arc::new(DefaultExpiredSessionStrategy::new(
                config.expired_session_url.clone(),
            )),
        }
    }

    pub fn new(
        registry: Arc<SessionRegistry>,
        invalid_strategy: Option<Arc<dyn InvalidSessionStrategy>>,
        expired_strategy: Arc<dyn ExpiredSessionStrategy>,
    ) -> Self {
        Self {
            registry,
            invalid_strategy,
            expired_strategy,
        }
    }

    /// Inspect one request. Call once per request, before any
    /// authentication-state handling.
    ///
    /// A request whose tracked session was expired is diverted even when
    /// it still carries a security context; that is what makes eviction
    /// by the concurrency limiter take effect on the session's next use.
    pub async fn inspect(&self, request: &RequestContext) -> RequestDisposition {
        let Some(session_id) = request.session_id.as_deref() else {
            // A fresh, unauthenticated request; not an error.
            return RequestDisposition::Continue;
        };

        if let Some(record) = self.registry.session_record(session_id).await {
            if record.is_expired() {
                let action = self.expired_strategy.on_expired(request, &record).await;
                return RequestDisposition::Recovered(action);
            }
            self.registry.update_last_used(session_id).await;
            return RequestDisposition::Continue;
        }

        if request.authenticated {
            // Valid security context over a session this core never
            // registered (e.g., established before the engine started);
            // nothing to recover from.
            return RequestDisposition::Continue;
        }

        match &self.invalid_strategy {
            Some(strategy) => {
                debug!("Request presented unrecognized session id {}", session_id);
                RequestDisposition::Recovered(strategy.on_invalid_session(request).await)
            }
            None => RequestDisposition::Continue,
        }
    }
}
