//! End-to-end tests of the request layer and session root against an in-process mock backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use inventory_access::client::{ApiClient, AuthExpired, HttpPermissionSource};
use inventory_access::config::Config;
use inventory_access::error::AppError;
use inventory_access::identity::{Credential, CredentialStore, UserIdentity};
use inventory_access::permissions::{GateState, PermissionSource, PermissionStatus, Requirement};
use inventory_access::session::AccessContext;

#[derive(Clone, Default)]
struct MockState {
    permission_calls: Arc<AtomicUsize>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

async fn login(Json(body): Json<Value>) -> Response {
    let user = body.get("username").and_then(|v| v.as_str()).unwrap_or("");
    let pass = body.get("password").and_then(|v| v.as_str()).unwrap_or("");
    if user == "alice" && pass == "pw" {
        Json(json!({"access_token": "tok-alice", "user_id": "U001", "username": "alice", "user_type_id": "UT001"})).into_response()
    } else if user == "mallory" && pass == "pw" {
        Json(json!({"access_token": "tok\u{7f}mallory", "user_id": "U666", "username": "mallory"})).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad credentials"}))).into_response()
    }
}

async fn permissions(State(st): State<MockState>, headers: HeaderMap) -> Response {
    st.permission_calls.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers).as_deref() {
        Some("tok-alice") => Json(json!({
            "user_id": "U001",
            "username": "alice",
            "user_type": {"id": "UT001", "type": "admin", "permission": 1},
            "permissions": ["lots.read", "lots.write", "items.read", "admin.roles"]
        }))
        .into_response(),
        Some("tok-reader") => Json(json!({
            "user_id": "U002",
            "username": "bob",
            "user_type": "viewer",
            "permissions": ["lots.read"]
        }))
        .into_response(),
        Some("tok-500") => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        Some("tok-broken") => (StatusCode::OK, "<html>not json</html>").into_response(),
        Some("tok-slow") => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"permissions": ["lots.read"]})).into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"msg": "Missing Authorization Header"}))).into_response(),
    }
}

async fn lots(headers: HeaderMap) -> Response {
    match bearer(&headers).as_deref() {
        Some("tok-alice") | Some("tok-reader") => Json(json!([{"id": "LOT1"}])).into_response(),
        Some(_) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"msg": "Signature verification failed"}))).into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({"msg": "Missing Authorization Header"}))).into_response(),
    }
}

// Start the mock backend on an ephemeral localhost port. Abort the handle to stop it.
async fn start_mock() -> (JoinHandle<()>, Url, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/api/auth/permissions", get(permissions))
        .route("/api/lots", get(lots))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock server error: {e:?}");
        }
    });
    let url = Url::parse(&format!("http://{addr}")).expect("url");
    (handle, url, state)
}

fn config_for(url: &Url, dir: &TempDir) -> Config {
    Config::default().with_api_url(url.clone()).with_session_dir(dir.path().join("session"))
}

fn credential(token: &str) -> Credential {
    Credential::new(token, UserIdentity { user_id: "U009".into(), username: "tester".into(), user_type_id: None }).expect("credential")
}

async fn wait_until<F: Fn() -> bool>(f: F) {
    for _ in 0..200 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn login_loads_permissions_and_logout_clears() -> Result<()> {
    let (server, url, state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let ctx = AccessContext::from_config(&config_for(&url, &tmp))?;

    let cred = ctx.login("alice", "pw").await?;
    assert_eq!(cred.token(), "tok-alice");
    assert_eq!(cred.identity().user_type_id.as_deref(), Some("UT001"));
    assert_eq!(state.permission_calls.load(Ordering::SeqCst), 1);

    let snap = ctx.snapshot();
    assert_eq!(snap.status(), &PermissionStatus::Ready);
    assert!(snap.can_write("lots"));
    assert!(!snap.can_delete("lots"));
    assert!(snap.is_admin());
    assert_eq!(snap.user_type().and_then(|t| t.name()), Some("admin"));

    ctx.logout();
    assert!(ctx.store().get().is_none());
    assert_eq!(ctx.snapshot().status(), &PermissionStatus::Unauthenticated);
    assert!(!ctx.snapshot().can_read("lots"));

    server.abort();
    Ok(())
}

#[tokio::test]
async fn rejected_login_is_not_a_session_expiry() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let ctx = AccessContext::from_config(&config_for(&url, &tmp))?;
    let mut expired = ctx.api().subscribe_expired();

    let err = ctx.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }), "got {err:?}");
    assert!(ctx.store().get().is_none());
    assert!(expired.try_recv().is_err());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn unencodable_bearer_is_stale_and_clears_the_store() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let store = Arc::new(CredentialStore::in_memory());
    let api = ApiClient::with_client(url, reqwest::Client::new(), store.clone());
    let mut expired = api.subscribe_expired();
    store.set(&credential("tok-alice"))?;

    let err = api.request::<()>(reqwest::Method::GET, "/api/lots", None, Some("t\u{f6}k\u{7f}")).await.unwrap_err();
    assert!(matches!(err, AppError::StaleCredential { .. }), "got {err:?}");
    assert!(store.get().is_none());
    assert!(expired.try_recv().is_err());

    // back to unauthenticated: the next call goes out without a bearer
    let err = api.get_json::<Value>("/api/lots", true).await.unwrap_err();
    assert!(matches!(err, AppError::Http { status: 401, .. }), "got {err:?}");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn login_with_unusable_token_stores_nothing() -> Result<()> {
    let (server, url, state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let ctx = AccessContext::from_config(&config_for(&url, &tmp))?;

    let err = ctx.login("mallory", "pw").await.unwrap_err();
    assert!(matches!(err, AppError::Decode { .. }), "got {err:?}");
    assert!(ctx.store().get().is_none());
    assert_eq!(state.permission_calls.load(Ordering::SeqCst), 0);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn downstream_422_tears_the_session_down() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let ctx = AccessContext::from_config(&config_for(&url, &tmp))?;
    ctx.spawn_expiry_listener();
    let mut expired = ctx.api().subscribe_expired();

    ctx.login("alice", "pw").await?;
    let lots: Value = ctx.api().get_json("/api/lots", true).await?;
    assert_eq!(lots[0]["id"], "LOT1");

    // server-side revocation
    ctx.store().set(&credential("tok-revoked"))?;
    let err = ctx.api().get_json::<Value>("/api/lots", true).await.unwrap_err();
    assert!(err.is_session_fatal());
    assert!(ctx.store().get().is_none());

    let ev: AuthExpired = expired.recv().await?;
    assert_eq!(ev.status, 422);
    assert_eq!(ev.endpoint, "/api/lots");

    wait_until(|| ctx.snapshot().status() == &PermissionStatus::Unauthenticated).await;
    assert!(!ctx.snapshot().is_admin());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn unauthenticated_call_does_not_fire_expiry() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let store = Arc::new(CredentialStore::in_memory());
    let api = ApiClient::with_client(url, reqwest::Client::new(), store);
    let mut expired = api.subscribe_expired();

    let err = api.get_json::<Value>("/api/lots", false).await.unwrap_err();
    assert!(matches!(err, AppError::Http { status: 401, .. }), "got {err:?}");
    assert!(expired.try_recv().is_err());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn no_credential_makes_no_permission_request() -> Result<()> {
    let (server, url, state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let ctx = AccessContext::from_config(&config_for(&url, &tmp))?;

    let err = ctx.resume().await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    assert_eq!(state.permission_calls.load(Ordering::SeqCst), 0);
    assert!(!ctx.snapshot().is_loading());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn server_error_and_malformed_body_are_fetch_failures() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let ctx = AccessContext::from_config(&config_for(&url, &tmp))?;

    for token in ["tok-500", "tok-broken"] {
        ctx.store().set(&credential(token))?;
        let err = ctx.resume().await.unwrap_err();
        assert!(matches!(err, AppError::PermissionFetchFailed { .. }), "{token}: {err:?}");
        let snap = ctx.snapshot();
        assert!(matches!(snap.status(), PermissionStatus::Failed(_)), "{token}");
        assert!(snap.is_empty());
        assert!(!snap.is_admin());
        // a failed fetch is recovered locally; the credential stays
        assert!(ctx.store().get().is_some());
    }

    server.abort();
    Ok(())
}

#[tokio::test]
async fn rejected_permission_fetch_fails_and_expires() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let store = Arc::new(CredentialStore::in_memory());
    let api = ApiClient::with_client(url, reqwest::Client::new(), store.clone());
    let mut expired = api.subscribe_expired();
    store.set(&credential("tok-unknown"))?;

    let source = HttpPermissionSource::new(api);
    let err = source.fetch("tok-unknown").await.unwrap_err();
    assert!(matches!(err, AppError::PermissionFetchFailed { .. }));
    assert_eq!(err.code_str(), "authorization_expired");
    assert_eq!(expired.recv().await?.status, 401);
    assert!(store.get().is_none());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn timeout_counts_as_fetch_failure() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let mut config = config_for(&url, &tmp);
    config.request_timeout = Some(Duration::from_secs(1));
    let ctx = AccessContext::from_config(&config)?;
    ctx.store().set(&credential("tok-slow"))?;

    let err = ctx.resume().await.unwrap_err();
    assert!(matches!(err, AppError::PermissionFetchFailed { .. }), "got {err:?}");
    assert!(ctx.snapshot().is_empty());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn persisted_session_resumes_in_a_new_context() -> Result<()> {
    let (server, url, state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let config = config_for(&url, &tmp);
    {
        let ctx = AccessContext::from_config(&config)?;
        ctx.login("alice", "pw").await?;
    }

    let ctx = AccessContext::from_config(&config)?;
    assert_eq!(ctx.store().get().map(|c| c.username().to_string()).as_deref(), Some("alice"));
    ctx.resume().await?;
    assert!(ctx.snapshot().can_read("items"));
    assert_eq!(state.permission_calls.load(Ordering::SeqCst), 2);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn gates_follow_refresh_after_role_change() -> Result<()> {
    let (server, url, _state) = start_mock().await;
    let tmp = tempfile::tempdir()?;
    let ctx = AccessContext::from_config(&config_for(&url, &tmp))?;
    ctx.store().set(&credential("tok-reader"))?;

    let write_gate = ctx.gate(Requirement::resource_action("lots", "write"));
    let mut read_gate = ctx.gate(Requirement::list(["lots.read", "items.read"], false));
    assert_eq!(write_gate.current(), GateState::Loading);

    ctx.resume().await?;
    assert_eq!(read_gate.settled().await, Some(GateState::Granted));
    assert_eq!(write_gate.current(), GateState::Denied);
    assert_eq!(ctx.snapshot().user_type().and_then(|t| t.name()), Some("viewer"));

    // promoted
    ctx.store().set(&credential("tok-alice"))?;
    ctx.cache().refresh().await?;
    assert_eq!(write_gate.current(), GateState::Granted);

    server.abort();
    Ok(())
}
