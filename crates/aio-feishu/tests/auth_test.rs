use std::sync::Arc;
use std::time::Duration;

use aio_core::{unix_now, BridgeError, Credential};
use aio_feishu::{ApiResponse, FakeBackend, RetryPolicy, TokenStore};
use serde_json::json;

const TOKEN_PATH: &str = "/auth/v3/tenant_access_token/internal";

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
    }
}

fn token_response(token: &str) -> serde_json::Value {
    json!({ "code": 0, "msg": "ok", "tenant_access_token": token, "expire": 7200 })
}

fn store(backend: &Arc<FakeBackend>) -> TokenStore {
    TokenStore::new("cli_test", "secret", backend.clone()).with_retry(fast_retry())
}

// ── Caching ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cached_token_is_reused() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_json(token_response("t-1"));
    let tokens = store(&backend);

    assert_eq!(tokens.get_token().await.unwrap(), "t-1");
    assert_eq!(tokens.get_token().await.unwrap(), "t-1");
    assert_eq!(backend.count_path(TOKEN_PATH).await, 1);

    let request = &backend.requests().await[0];
    assert!(request.bearer.is_none());
    match &request.body {
        aio_feishu::RequestBody::Json(body) => {
            assert_eq!(body, &json!({ "app_id": "cli_test", "app_secret": "secret" }))
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[tokio::test]
async fn seeded_credential_valid_beyond_margin_is_used() {
    let backend = Arc::new(FakeBackend::new());
    let tokens = store(&backend).with_credential(Some(Credential::issued(
        "persisted",
        unix_now(),
        3600,
    )));
    assert_eq!(tokens.get_token().await.unwrap(), "persisted");
    assert!(backend.requests().await.is_empty());
}

#[tokio::test]
async fn credential_inside_margin_is_refreshed_once() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_json(token_response("fresh"));
    // Expires in 100 s, well inside the 300 s margin.
    let tokens = store(&backend)
        .with_margin(Duration::from_secs(300))
        .with_credential(Some(Credential::issued("stale", unix_now(), 100)));

    assert_eq!(tokens.get_token().await.unwrap(), "fresh");
    assert_eq!(tokens.get_token().await.unwrap(), "fresh");
    assert_eq!(backend.count_path(TOKEN_PATH).await, 1);

    let credential = tokens.credential().await.unwrap();
    assert!(credential.expires_at >= unix_now() + 7000);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let backend = Arc::new(FakeBackend::new().with_latency(Duration::from_millis(50)));
    backend.push_json(token_response("shared"));
    let tokens = store(&backend);

    let results = futures::future::join_all((0..16).map(|_| tokens.get_token())).await;
    for result in results {
        assert_eq!(result.unwrap(), "shared");
    }
    assert_eq!(backend.count_path(TOKEN_PATH).await, 1);
}

#[tokio::test]
async fn refresh_forces_new_credential() {
    let backend = Arc::new(FakeBackend::new());
    backend
        .push_json(token_response("t-1"))
        .push_json(token_response("t-2"));
    let tokens = store(&backend);

    assert_eq!(tokens.get_token().await.unwrap(), "t-1");
    assert_eq!(tokens.refresh().await.unwrap(), "t-2");
    assert_eq!(tokens.get_token().await.unwrap(), "t-2");
    assert_eq!(backend.count_path(TOKEN_PATH).await, 2);
}

#[tokio::test]
async fn missing_expire_defaults_to_two_hours() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_json(json!({ "code": 0, "tenant_access_token": "t" }));
    let tokens = store(&backend);
    tokens.get_token().await.unwrap();

    let expires_at = tokens.credential().await.unwrap().expires_at;
    let expected = unix_now() + 7200;
    assert!((expected - expires_at).abs() <= 2, "expires_at={expires_at}");
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_credentials_are_auth_errors() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_json(json!({ "code": 10014, "msg": "app secret invalid" }));
    let tokens = store(&backend);

    let err = tokens.get_token().await.unwrap_err();
    assert!(matches!(err, BridgeError::Auth(_)), "got: {err}");
    assert!(err.to_string().contains("10014"));
    assert!(tokens.credential().await.is_none());
}

#[tokio::test]
async fn response_without_token_is_auth_error() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_json(json!({ "code": 0, "msg": "ok" }));
    let err = store(&backend).get_token().await.unwrap_err();
    assert!(matches!(err, BridgeError::Auth(_)), "got: {err}");
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let backend = Arc::new(FakeBackend::new());
    backend
        .push_error(BridgeError::Transport("connection reset".to_string()))
        .push_json(token_response("t-1"));
    let tokens = store(&backend);

    assert_eq!(tokens.get_token().await.unwrap(), "t-1");
    assert_eq!(backend.count_path(TOKEN_PATH).await, 2);
}

#[tokio::test]
async fn retries_are_bounded() {
    let backend = Arc::new(FakeBackend::new());
    for _ in 0..3 {
        backend.push_error(BridgeError::Transport("timeout".to_string()));
    }
    let err = store(&backend).get_token().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(backend.count_path(TOKEN_PATH).await, 2);
}

#[tokio::test]
async fn server_error_is_retried_as_transient() {
    let backend = Arc::new(FakeBackend::new());
    backend
        .push_response(ApiResponse {
            status: 503,
            body: json!({ "code": -1, "msg": "service unavailable" }),
        })
        .push_json(token_response("t-1"));
    let tokens = store(&backend);

    assert_eq!(tokens.get_token().await.unwrap(), "t-1");
    assert_eq!(backend.count_path(TOKEN_PATH).await, 2);
}

#[tokio::test]
async fn persistent_server_error_is_not_an_auth_error() {
    let backend = Arc::new(FakeBackend::new());
    for _ in 0..2 {
        backend.push_response(ApiResponse {
            status: 502,
            body: json!({ "code": -1, "msg": "bad gateway" }),
        });
    }
    let err = store(&backend).get_token().await.unwrap_err();
    assert!(matches!(err, BridgeError::Transport(_)));
}
