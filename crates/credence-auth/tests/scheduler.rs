//! Proactive refresh scheduling.

mod helpers;

use std::time::Duration;

use credence_auth::SessionStatus;
use credence_core::traits::{RefreshResponse, TransportError};
use credence_core::types::AccessToken;

use helpers::{Harness, ScriptedTransport, grant, make_token, success};

fn network_down() -> Result<RefreshResponse, TransportError> {
    Err(TransportError::Network("connection refused".to_string()))
}

#[tokio::test(start_paused = true)]
async fn test_refreshes_ahead_of_expiry_and_is_idempotent() {
    let fresh = make_token(3600, None);
    let h = Harness::volatile_only(ScriptedTransport::always(Ok(success(&fresh, "r-2"))));
    let service = h.engine.service();
    // Expires 125 s from now: the refresh is due in about 5 s.
    service.establish_session(grant(125, "r-1")).await.unwrap();

    assert!(service.schedule_proactive_refresh());
    assert!(!service.schedule_proactive_refresh());
    assert!(service.is_refresh_scheduled());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.transport.calls(), 0);

    h.transport.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stored = h.engine.storage().read_credentials().await;
    assert_eq!(
        stored.access_token.map(AccessToken::into_inner),
        Some(fresh)
    );
    assert!(service.is_refresh_scheduled());

    // The new token is good for an hour; nothing else happens soon.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.calls(), 1);
    service.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_logout_cancels_schedule() {
    let h = Harness::volatile_only(ScriptedTransport::always(network_down()));
    let service = h.engine.service();
    service.establish_session(grant(125, "r-1")).await.unwrap();
    assert!(service.schedule_proactive_refresh());

    service.logout().await;
    assert!(!service.is_refresh_scheduled());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_schedule_exhausts_and_expires() {
    let h = Harness::volatile_only(ScriptedTransport::always(network_down()));
    let service = h.engine.service();
    // Inside the lead window already: the first attempt is immediate.
    service.establish_session(grant(60, "r-1")).await.unwrap();
    assert!(service.schedule_proactive_refresh());

    h.transport.wait_for_calls(3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(service.status(), SessionStatus::Expired);
    assert!(!service.is_refresh_scheduled());
    assert!(h.engine.storage().read_credentials().await.is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.calls(), 3);
    assert!(!service.schedule_proactive_refresh());
}

#[tokio::test(start_paused = true)]
async fn test_new_login_replaces_schedule() {
    let h = Harness::volatile_only(ScriptedTransport::always(network_down()));
    let service = h.engine.service();
    service.establish_session(grant(3600, "r-1")).await.unwrap();
    assert!(service.schedule_proactive_refresh());

    service.establish_session(grant(3600, "r-2")).await.unwrap();
    assert!(!service.is_refresh_scheduled());
    assert!(service.schedule_proactive_refresh());
    service.shutdown();
    assert!(!service.is_refresh_scheduled());
}
