use session_control::{
    EventBus, FixationPolicy, InMemorySessionHost, InvalidSessionDetector, Principal,
    RecoveryAction, RequestContext, RequestDisposition, SessionAttributes,
    SessionAuthenticationOrchestrator, SessionControlConfig, SessionError, SessionEvent,
    SessionEventListener, SessionHost, SessionLifecycleNotifier, SessionRegistry,
};
use std::sync::{Arc, Mutex};

fn batman() -> Principal {
    Principal::named("batman")
}

fn engine(
    config: SessionControlConfig,
) -> (
    Arc<SessionRegistry>,
    SessionAuthenticationOrchestrator,
    InvalidSessionDetector,
    EventBus,
) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let registry = Arc::new(SessionRegistry::new());
    let events = EventBus::new();
    let orchestrator =
        SessionAuthenticationOrchestrator::new(registry.clone(), &config, events.clone());
    let detector = InvalidSessionDetector::from_config(registry.clone(), &config);
    (registry, orchestrator, detector, events)
}

#[derive(Default)]
struct RecordingListener {
    seen: Mutex<Vec<SessionEvent>>,
}

impl SessionEventListener for RecordingListener {
    fn on_event(&self, event: &SessionEvent) {
        self.seen.lock().unwrap().push(event.clone());
    }
}

/// With max_sessions=1 and evict policy, a second login expires the first
/// session and leaves exactly the new one active.
#[tokio::test]
async fn test_second_login_evicts_first_session() {
    let config = SessionControlConfig {
        max_sessions: 1,
        ..Default::default()
    };
    let (registry, orchestrator, detector, _) = engine(config);

    let first = orchestrator
        .on_authentication_success(batman(), &InMemorySessionHost::new())
        .await
        .unwrap();

    // Make the second login's timestamp strictly later.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let second = orchestrator
        .on_authentication_success(batman(), &InMemorySessionHost::new())
        .await
        .unwrap();

    let active = registry.all_sessions(&batman(), false).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, second.session_id);

    let evicted = registry.session_record(&first.session_id).await.unwrap();
    assert!(evicted.is_expired());

    // The evicted session is diverted on its next use.
    let mut request = RequestContext::with_session(first.session_id);
    request.authenticated = true;
    request.interactive = false;
    assert_eq!(
        detector.inspect(&request).await,
        RequestDisposition::Recovered(RecoveryAction::Unauthorized)
    );
}

/// With the reject policy, the second login fails and the first session
/// stays the only (and still active) one.
#[tokio::test]
async fn test_second_login_rejected_when_prevents_login() {
    let config = SessionControlConfig {
        max_sessions: 1,
        max_sessions_prevents_login: true,
        ..Default::default()
    };
    let (registry, orchestrator, _, _) = engine(config);

    let first = orchestrator
        .on_authentication_success(batman(), &InMemorySessionHost::new())
        .await
        .unwrap();

    let err = orchestrator
        .on_authentication_success(batman(), &InMemorySessionHost::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::ConcurrentLoginRejected { max: 1 }
    ));

    let active = registry.all_sessions(&batman(), false).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, first.session_id);
    assert!(!active[0].is_expired());
}

/// A request bearing a session id the registry has never seen triggers
/// the recovery action and goes no further.
#[tokio::test]
async fn test_unknown_session_id_is_recovered() {
    let config = SessionControlConfig {
        invalid_session_url: Some("/login?invalid".to_string()),
        ..Default::default()
    };
    let (_, _, detector, _) = engine(config);

    let disposition = detector
        .inspect(&RequestContext::with_session("forged-or-stale"))
        .await;
    assert_eq!(
        disposition,
        RequestDisposition::Recovered(RecoveryAction::Redirect("/login?invalid".to_string()))
    );
}

/// Quotas hold per principal, not globally.
#[tokio::test]
async fn test_quota_is_per_principal() {
    let config = SessionControlConfig {
        max_sessions: 1,
        max_sessions_prevents_login: true,
        ..Default::default()
    };
    let (registry, orchestrator, _, _) = engine(config);

    orchestrator
        .on_authentication_success(batman(), &InMemorySessionHost::new())
        .await
        .unwrap();
    orchestrator
        .on_authentication_success(Principal::named("robin"), &InMemorySessionHost::new())
        .await
        .unwrap();

    let mut principals = registry.all_principals().await;
    principals.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(principals, vec![batman(), Principal::named("robin")]);
}

/// Eight simultaneous logins under max_sessions=1 settle at exactly one
/// active session: the register/count/evict section is atomic per
/// principal.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_settle_at_quota() {
    let config = SessionControlConfig {
        max_sessions: 1,
        ..Default::default()
    };
    let (registry, orchestrator, _, _) = engine(config);
    let orchestrator = Arc::new(orchestrator);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .on_authentication_success(batman(), &InMemorySessionHost::new())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(registry.all_sessions(&batman(), false).await.len(), 1);
}

/// A destroyed session disappears from the registry entirely, even with
/// include_expired, and listeners hear about it.
#[tokio::test]
async fn test_lifecycle_destroy_drops_record() {
    let (registry, orchestrator, _, events) = engine(SessionControlConfig::default());
    let listener = Arc::new(RecordingListener::default());
    events.subscribe(listener.clone());

    let record = orchestrator
        .on_authentication_success(batman(), &InMemorySessionHost::new())
        .await
        .unwrap();
    registry.expire_now(&record.session_id).await;

    // Expiry alone retains the record for include_expired queries.
    assert_eq!(registry.all_sessions(&batman(), true).await.len(), 1);

    let notifier = SessionLifecycleNotifier::new(registry.clone(), events);
    notifier.on_session_destroyed(&record.session_id).await;

    assert!(registry.all_sessions(&batman(), true).await.is_empty());
    assert!(listener
        .seen
        .lock()
        .unwrap()
        .contains(&SessionEvent::SessionDestroyed {
            session_id: record.session_id,
        }));
}

/// Logging in over an attacker-visible session rotates the identifier,
/// keeps the attributes (migrate policy), and announces the rotation.
#[tokio::test]
async fn test_fixation_rotation_end_to_end() {
    let config = SessionControlConfig {
        fixation_protection: FixationPolicy::MigrateSession,
        ..Default::default()
    };
    let (registry, orchestrator, _, events) = engine(config);
    let listener = Arc::new(RecordingListener::default());
    events.subscribe(listener.clone());

    let mut attributes = SessionAttributes::new();
    attributes.insert("cart".to_string(), serde_json::json!("3 items"));
    let host = InMemorySessionHost::with_session(attributes.clone());
    let seeded_id = host.current_session_id().await.unwrap();

    let record = orchestrator
        .on_authentication_success(batman(), &host)
        .await
        .unwrap();

    assert_ne!(record.session_id, seeded_id);
    assert_eq!(host.attributes().await, attributes);
    assert!(listener.seen.lock().unwrap().iter().any(|e| matches!(
        e,
        SessionEvent::FixationProtectionApplied { old_session_id, new_session_id }
            if *old_session_id == seeded_id && *new_session_id == record.session_id
    )));

    // The seeded identifier is worthless afterwards.
    assert!(registry.session_record(&seeded_id).await.is_none());
}
