// Per-principal concurrent-session quota enforcement

use crate::error::SessionError;
use crate::session::{Principal, SessionRegistry};
use tracing::{info, warn};

pub(crate) const QUOTA_EXPIRY_REASON: &str = "exceeded maximum number of sessions";

/// Enforces the maximum number of concurrent sessions per principal.
///
/// Runs after the fresh session has been registered. When the quota is
/// exceeded it either evicts the least recently used session(s) or, with
/// the reject policy, denies the new login — in which case the caller is
/// responsible for rolling the fresh registration back.
pub struct ConcurrencyLimiter {
    max_sessions: Option<usize>,
    prevents_login: bool,
}

impl ConcurrencyLimiter {
    /// `max_sessions = -1` means unlimited; the configuration validator
    /// has already rejected zero and other negatives.
    pub fn new(max_sessions: i32, prevents_login: bool) -> Self {
        Self {
            max_sessions: usize::try_from(max_sessions).ok(),
            prevents_login,
        }
    }

    /// Check the quota for `principal` after `fresh_session_id` was
    /// registered, evicting or rejecting as configured.
    pub async fn enforce(
        &self,
        registry: &SessionRegistry,
        principal: &Principal,
        fresh_session_id: &str,
    ) -> Result<(), SessionError> {
        let Some(max_sessions) = self.max_sessions else {
            return Ok(());
        };

        let existing: Vec<_> = registry
            .all_sessions(principal, false)
            .await
            .into_iter()
            .filter(|record| record.session_id != fresh_session_id)
            .collect();

        if existing.len() < max_sessions {
            return Ok(());
        }

        if self.prevents_login {
            warn!(
                "Rejecting login for principal {}: already holds {} of {} allowed session(s)",
                principal,
                existing.len(),
                max_sessions
            );
            return Err(SessionError::ConcurrentLoginRejected { max: max_sessions });
        }

        // Evict enough least-recently-used sessions that, with the fresh
        // one, the principal settles exactly at the quota. all_sessions
        // already orders ascending by last_request_at with id tie-break.
        let victims = existing.len() - max_sessions + 1;
        for record in existing.iter().take(victims) {
            info!(
                "Evicting session {} for principal {} to enforce quota of {}",
                record.session_id, principal, max_sessions
            );
            registry
                .expire_with_reason(&record.session_id, Some(QUOTA_EXPIRY_REASON))
                .await;
        }

        Ok(())
    }
}
