// Request-path checks run before authentication logic

pub mod invalid_session;

pub use invalid_session::{
    DefaultExpiredSessionStrategy, ExpiredSessionStrategy, InvalidSessionDetector,
    InvalidSessionStrategy, RecoveryAction, RedirectInvalidSessionStrategy, RequestContext,
    RequestDisposition,
};
