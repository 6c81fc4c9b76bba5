// Process-wide registry of live sessions per authenticated principal

use super::types::{Principal, SessionRecord};
use crate::error::SessionError;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The principal/session index. Both maps are kept in sync and only ever
/// touched while holding the registry lock.
#[derive(Default)]
struct PrincipalSessionIndex {
    by_id: HashMap<String, SessionRecord>,
    by_principal: HashMap<Principal, HashSet<String>>,
}

impl PrincipalSessionIndex {
    fn unlink(&mut self, record: &SessionRecord) {
        if let Some(ids) = self.by_principal.get_mut(&record.principal) {
            ids.remove(&record.session_id);
            if ids.is_empty() {
                self.by_principal.remove(&record.principal);
            }
        }
    }
}

/// Tracks every session the authentication layer has registered, keyed by
/// session id and indexed by principal.
///
/// This is the only mutable structure shared across in-flight requests;
/// every operation takes the lock for the full duration of its mutation,
/// so individual operations are linearizable. Multi-operation sequences
/// (register, count, evict) are serialized per principal by the
/// orchestrator on top of this.
pub struct SessionRegistry {
    index: RwLock<PrincipalSessionIndex>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            index: RwLock::new(PrincipalSessionIndex::default()),
        }
    }

    /// Create and index a new record for a freshly authenticated session.
    ///
    /// Fails with [`SessionError::DuplicateSession`] if the identifier is
    /// already tracked and not expired. An expired record under the same
    /// identifier is replaced: it was only being retained until the host
    /// reports destruction, and uniqueness binds non-expired ids.
    pub async fn register_new_session(
        &self,
        session_id: &str,
        principal: Principal,
    ) -> Result<SessionRecord, SessionError> {
        let mut index = self.index.write().await;

        if let Some(existing) = index.by_id.get(session_id) {
            if !existing.is_expired() {
                return Err(SessionError::DuplicateSession(session_id.to_string()));
            }
            let stale = existing.clone();
            index.unlink(&stale);
            index.by_id.remove(session_id);
        }

        let record = SessionRecord::new(session_id, principal.clone());
        index
            .by_principal
            .entry(principal.clone())
            .or_default()
            .insert(session_id.to_string());
        index.by_id.insert(session_id.to_string(), record.clone());

        info!("Registered session {} for principal {}", session_id, principal);
        Ok(record)
    }

    /// Bump a session's last-request timestamp.
    ///
    /// A no-op if the id is unknown: the record may have been removed by a
    /// concurrent destroy notification.
    pub async fn update_last_used(&self, session_id: &str) {
        let mut index = self.index.write().await;
        match index.by_id.get_mut(session_id) {
            Some(record) => record.touch(Utc::now()),
            None => debug!("update_last_used: session {} not tracked, ignoring", session_id),
        }
    }

    /// Look up a single record by session id.
    pub async fn session_record(&self, session_id: &str) -> Option<SessionRecord> {
        let index = self.index.read().await;
        index.by_id.get(session_id).cloned()
    }

    /// All principals with at least one tracked (possibly expired) session.
    pub async fn all_principals(&self) -> Vec<Principal> {
        let index = self.index.read().await;
        index.by_principal.keys().cloned().collect()
    }

    /// All sessions for a principal, least recently used first, ties
    /// broken by session id so ordering is reproducible. Expired records
    /// are filtered out unless `include_expired` is set.
    pub async fn all_sessions(
        &self,
        principal: &Principal,
        include_expired: bool,
    ) -> Vec<SessionRecord> {
        let index = self.index.read().await;

        let mut sessions: Vec<SessionRecord> = index
            .by_principal
            .get(principal)
            .into_iter()
            .flatten()
            .filter_map(|id| index.by_id.get(id))
            .filter(|record| include_expired || !record.is_expired())
            .cloned()
            .collect();

        sessions.sort_by(|a, b| {
            a.last_request_at
                .cmp(&b.last_request_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        sessions
    }

    /// Mark a session expired without removing it. Idempotent; unknown
    /// ids are ignored. The record stays queryable (with
    /// `include_expired`) until the host reports destruction.
    pub async fn expire_now(&self, session_id: &str) {
        self.expire_with_reason(session_id, None).await;
    }

    pub(crate) async fn expire_with_reason(&self, session_id: &str, reason: Option<&str>) {
        let mut index = self.index.write().await;
        if let Some(record) = index.by_id.get_mut(session_id) {
            if !record.is_expired() {
                info!(
                    "Expiring session {} for principal {}{}",
                    session_id,
                    record.principal,
                    reason.map(|r| format!(": {}", r)).unwrap_or_default()
                );
            }
            record.expire(reason.map(|r| r.to_string()));
        }
    }

    /// Remove a record entirely, expired or not. Idempotent; used by the
    /// lifecycle notifier when the host destroys a session.
    pub async fn remove_session_record(&self, session_id: &str) {
        let mut index = self.index.write().await;
        if let Some(record) = index.by_id.remove(session_id) {
            index.unlink(&record);
            info!(
                "Removed session {} for principal {}",
                session_id, record.principal
            );
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
