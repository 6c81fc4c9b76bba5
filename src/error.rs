//! Error types for the session-control layer.

/// Errors surfaced by session registration, concurrency control, and
/// fixation protection.
///
/// Lookup misses on `update_last_used` and repeated `expire_now` /
/// `remove_session_record` calls are documented no-ops, not errors: the
/// record may have legitimately expired or been removed by a concurrent
/// request.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Registration was attempted for a session identifier that is already
    /// tracked and not expired. Indicates a host-level identifier
    /// collision; the login must be aborted.
    #[error("session '{0}' is already registered and not expired")]
    DuplicateSession(String),

    /// The principal already holds the maximum number of concurrent
    /// sessions and the reject policy is in effect. The caller maps this
    /// to a redirect (interactive) or an unauthorized response.
    #[error("maximum of {max} concurrent session(s) exceeded for this principal")]
    ConcurrentLoginRejected { max: usize },

    /// The `change_session_id` fixation policy was requested but the
    /// session host cannot rotate identifiers in place. A configuration
    /// error; fail fast at startup where possible.
    #[error("session host does not support changing the session id in place")]
    UnsupportedBySessionHost,

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),
}
