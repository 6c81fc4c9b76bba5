// Session authentication and concurrency-control engine.
// A web-facing authentication layer delegates to this core for expired-
// session detection, per-principal concurrent-login limits, and
// session-fixation protection.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod middleware;
pub mod session;

pub use auth::{
    FixationPolicy, InMemorySessionHost, SessionAttributes, SessionAuthenticationOrchestrator,
    SessionHost,
};
pub use config::SessionControlConfig;
pub use error::SessionError;
pub use events::{EventBus, SessionEvent, SessionEventListener};
pub use lifecycle::SessionLifecycleNotifier;
pub use middleware::{InvalidSessionDetector, RecoveryAction, RequestContext, RequestDisposition};
pub use session::{Principal, SessionRecord, SessionRegistry};
