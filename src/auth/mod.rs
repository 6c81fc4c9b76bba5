// Authentication-time session handling
// Fixation protection, concurrency limits, and the pipeline composing them

pub mod concurrency;
pub mod fixation;
pub mod orchestrator;

pub use concurrency::ConcurrencyLimiter;
pub use fixation::{
    FixationPolicy, InMemorySessionHost, SessionAttributes, SessionFixationGuard, SessionHost,
};
pub use orchestrator::{PostAuthStrategy, SessionAuthenticationOrchestrator};
