//! HTTP refresh transport against a local auth server.

mod helpers;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use axum::Json;
use reqwest::cookie::Jar;
use serde_json::{Value, json};

use credence_auth::{CredentialEngine, HttpRefreshTransport};
use credence_core::config::AppConfig;
use credence_core::config::auth_server::AuthServerConfig;
use credence_core::config::storage::CookieStorageConfig;
use credence_core::traits::{RefreshTransport, StorageBackend, TransportError};
use credence_core::types::{AccessToken, CredentialKey, RefreshToken};
use credence_storage::CookieBackend;

use helpers::{grant, make_token};

const REFRESH_PATH: &str = "/api/auth/refresh";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn auth_config(base: &str) -> AuthServerConfig {
    AuthServerConfig {
        refresh_url: format!("{base}{REFRESH_PATH}"),
        timeout_seconds: 5,
    }
}

/// Router rotating `expected` into `access` / "r-2".
fn rotating_server(expected: &'static str, access: String) -> Router {
    Router::new().route(
        REFRESH_PATH,
        post(move |Json(body): Json<Value>| {
            let access = access.clone();
            async move {
                if body["refreshToken"] != expected {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unknown token"})));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "accessToken": access,
                        "refreshToken": "r-2",
                        "expiresAt": 1_900_000_000i64,
                        "refreshExpiresAt": "2030-01-01T00:00:00Z",
                    })),
                )
            }
        }),
    )
}

#[tokio::test]
async fn test_successful_refresh_decodes_response() {
    let fresh = make_token(3600, None);
    let base = serve(rotating_server("r-1", fresh.clone())).await;
    let transport = HttpRefreshTransport::new(&auth_config(&base), Arc::new(Jar::default())).unwrap();

    let response = transport.refresh(&RefreshToken::new("r-1")).await.unwrap();
    assert_eq!(response.access_token.as_deref(), Some(fresh.as_str()));
    assert_eq!(response.refresh_token.as_deref(), Some("r-2"));
    assert_eq!(response.expires_at.map(|t| t.timestamp()), Some(1_900_000_000));
    assert_eq!(
        response.refresh_expires_at.map(|t| t.to_rfc3339()),
        Some("2030-01-01T00:00:00+00:00".to_string())
    );
}

#[tokio::test]
async fn test_client_error_is_rejected() {
    let base = serve(Router::new().route(
        REFRESH_PATH,
        post(|| async { (StatusCode::UNAUTHORIZED, "refresh token revoked") }),
    ))
    .await;
    let transport = HttpRefreshTransport::new(&auth_config(&base), Arc::new(Jar::default())).unwrap();

    let err = transport.refresh(&RefreshToken::new("r-1")).await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Rejected {
            status: 401,
            body: "refresh token revoked".to_string()
        }
    );
}

#[tokio::test]
async fn test_server_error_is_rejected_with_status() {
    let base = serve(Router::new().route(
        REFRESH_PATH,
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    ))
    .await;
    let transport = HttpRefreshTransport::new(&auth_config(&base), Arc::new(Jar::default())).unwrap();

    let err = transport.refresh(&RefreshToken::new("r-1")).await.unwrap_err();
    assert!(matches!(err, TransportError::Rejected { status: 503, .. }));
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let base = serve(Router::new().route(REFRESH_PATH, post(|| async { "<html>oops</html>" }))).await;
    let transport = HttpRefreshTransport::new(&auth_config(&base), Arc::new(Jar::default())).unwrap();

    let err = transport.refresh(&RefreshToken::new("r-1")).await.unwrap_err();
    assert!(matches!(err, TransportError::Malformed(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let transport = HttpRefreshTransport::new(
        &auth_config(&format!("http://{addr}")),
        Arc::new(Jar::default()),
    )
    .unwrap();

    let err = transport.refresh(&RefreshToken::new("r-1")).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
}

#[tokio::test]
async fn test_cookie_backend_values_are_sent_with_requests() {
    let fresh = make_token(3600, None);
    let router = Router::new().route(
        REFRESH_PATH,
        post(move |headers: HeaderMap| {
            let fresh = fresh.clone();
            async move {
                let cookies = headers
                    .get(header::COOKIE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if !cookies.contains("refreshToken=r-cookie") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "cookies": cookies })));
                }
                (
                    StatusCode::OK,
                    Json(json!({ "accessToken": fresh, "refreshToken": "r-2" })),
                )
            }
        }),
    );
    let base = serve(router).await;

    let jar = Arc::new(Jar::default());
    let cookies = CookieBackend::new(
        &CookieStorageConfig {
            origin: format!("{base}/"),
            ..Default::default()
        },
        Arc::clone(&jar),
    );
    cookies
        .set(CredentialKey::RefreshToken, "r-cookie")
        .await
        .unwrap();

    let transport = HttpRefreshTransport::new(&auth_config(&base), jar).unwrap();
    let response = transport.refresh(&RefreshToken::new("r-1")).await.unwrap();
    assert_eq!(response.refresh_token.as_deref(), Some("r-2"));
}

#[tokio::test]
async fn test_engine_refreshes_through_http_into_every_backend() {
    let fresh = make_token(3600, Some("admin"));
    let base = serve(rotating_server("r-1", fresh.clone())).await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = AppConfig::default();
    config.auth_server = auth_config(&base);
    config.storage.durable.path = dir.path().join("credentials.json").display().to_string();
    config.storage.embedded.path = dir.path().join("credentials.db").display().to_string();
    config.storage.cookie.origin = format!("{base}/");

    let engine = CredentialEngine::from_config(&config).unwrap();
    let service = engine.service();
    service.establish_session(grant(-5, "r-1")).await.unwrap();

    let token = service.get_valid_token().await.unwrap();
    assert_eq!(token.as_str(), fresh);
    assert_eq!(service.get_user_role().await.as_deref(), Some("admin"));

    let snapshot = engine.storage().snapshot().await;
    assert_eq!(snapshot.len(), 4);
    for backend in &snapshot {
        assert!(backend.available, "{} unavailable", backend.kind);
        assert_eq!(backend.keys.len(), 3, "{} incomplete", backend.kind);
    }
    let stored = engine.storage().read_credentials().await;
    assert_eq!(
        stored.access_token.map(AccessToken::into_inner),
        Some(fresh)
    );
    assert_eq!(
        stored.refresh_token.map(RefreshToken::into_inner),
        Some("r-2".to_string())
    );
}
