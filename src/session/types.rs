// Session types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated identity a session is bound to.
///
/// Two principals that compare equal are the same user for concurrency
/// purposes. Equality covers the name plus an optional qualifier so a
/// deployment can discriminate between, say, interactive and service
/// logins under the same account name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Account name the session belongs to.
    pub name: String,
    /// Optional discriminator (e.g., realm or login kind). `None` and
    /// `Some` never compare equal.
    #[serde(default)]
    pub qualifier: Option<String>,
}

impl Principal {
    /// Create a principal with no qualifier.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}[{}]", self.name, q),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Bookkeeping record for one tracked session.
///
/// The identifier is current at any instant but may change over the
/// record's life when fixation protection rotates it. The principal never
/// changes after creation, and `expired` is never cleared once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identifier, unique among non-expired records.
    pub session_id: String,
    /// Identity the session is bound to.
    pub principal: Principal,
    /// When the record was registered.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent observed request, never decreasing.
    pub last_request_at: DateTime<Utc>,
    pub(crate) expired: bool,
    pub(crate) expiry_reason: Option<String>,
}

impl SessionRecord {
    /// Create a fresh, non-expired record stamped with the current time.
    pub fn new(session_id: impl Into<String>, principal: Principal) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            principal,
            created_at: now,
            last_request_at: now,
            expired: false,
            expiry_reason: None,
        }
    }

    /// Whether the session has been marked expired (evicted or destroyed).
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Human-readable note set when the session was explicitly expired.
    pub fn expiry_reason(&self) -> Option<&str> {
        self.expiry_reason.as_deref()
    }

    /// Bump `last_request_at`, keeping it monotonically non-decreasing
    /// even if the supplied clock reading is behind.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_request_at {
            self.last_request_at = now;
        }
    }

    /// Mark the record expired. Idempotent; the first call wins the
    /// reason, later calls change nothing.
    pub(crate) fn expire(&mut self, reason: Option<String>) {
        if !self.expired {
            self.expired = true;
            self.expiry_reason = reason;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_principal_equality() {
        assert_eq!(Principal::named("batman"), Principal::named("batman"));
        assert_ne!(Principal::named("batman"), Principal::named("robin"));

        let interactive = Principal {
            name: "batman".to_string(),
            qualifier: Some("interactive".to_string()),
        };
        assert_ne!(interactive, Principal::named("batman"));
    }

    #[test]
    fn test_record_touch_is_monotonic() {
        let mut record = SessionRecord::new("sid-1", Principal::named("batman"));
        let before = record.last_request_at;

        record.touch(before - Duration::seconds(30));
        assert_eq!(record.last_request_at, before);

        let later = before + Duration::seconds(30);
        record.touch(later);
        assert_eq!(record.last_request_at, later);
    }

    #[test]
    fn test_expire_is_idempotent_and_keeps_first_reason() {
        let mut record = SessionRecord::new("sid-1", Principal::named("batman"));
        assert!(!record.is_expired());

        record.expire(Some("exceeded maximum number of sessions".to_string()));
        assert!(record.is_expired());

        record.expire(Some("something else".to_string()));
        assert!(record.is_expired());
        assert_eq!(
            record.expiry_reason(),
            Some("exceeded maximum number of sessions")
        );
    }
}
