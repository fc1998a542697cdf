//! The sync client's refresh-and-replay contract, against a scripted server.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use keeper_core::sync::{AuthResponse, RefreshRequest, SyncClient, SyncEngine};
use keeper_core::{
    clock, AuthTokenPair, Database, KeeperError, LastSync, SecretKind, SecretRecord,
    SecretRepository, TokenStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SALT_HEX: &str = "000102030405060708090a0b0c0d0e0f";

struct Script {
    /// Access token handed out by /refresh.
    issued_access: &'static str,
    refresh_calls: AtomicUsize,
    last_sync_calls: AtomicUsize,
    item_calls: AtomicUsize,
}

type Shared = Arc<Script>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer fresh")
        .unwrap_or(false)
}

async fn last_sync(
    State(script): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<LastSync>, StatusCode> {
    script.last_sync_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(LastSync {
        updated_at: clock::epoch(),
    }))
}

async fn items(
    State(script): State<Shared>,
    headers: HeaderMap,
    Json(_batch): Json<Vec<SecretRecord>>,
) -> Result<Json<Vec<SecretRecord>>, StatusCode> {
    script.item_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(Vec::new()))
}

async fn refresh(
    State(script): State<Shared>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    script.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if request.token != "refresh-1" {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(AuthResponse {
        access_token: script.issued_access.to_string(),
        refresh_token: "refresh-2".to_string(),
        salt: SALT_HEX.to_string(),
    }))
}

async fn spawn_server(issued_access: &'static str) -> (String, Shared) {
    let script = Arc::new(Script {
        issued_access,
        refresh_calls: AtomicUsize::new(0),
        last_sync_calls: AtomicUsize::new(0),
        item_calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/api/v1/sync/last-sync", get(last_sync))
        .route("/api/v1/sync/items", post(items))
        .route("/api/v1/auth/refresh", post(refresh))
        .with_state(script.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), script)
}

fn stale_client(url: &str) -> (SyncClient, SecretRepository) {
    let db = Database::in_memory().unwrap().shared();
    let tokens = TokenStore::new(db.clone());
    tokens
        .save(&AuthTokenPair {
            access_token: "stale".to_string(),
            refresh_token: "refresh-1".to_string(),
        })
        .unwrap();

    let client = SyncClient::new(url, Duration::from_secs(5), tokens).unwrap();
    (client, SecretRepository::new(db))
}

fn local_record() -> SecretRecord {
    SecretRecord {
        uid: "local".to_string(),
        kind: SecretKind::Text,
        ciphertext: vec![7u8; 40],
        description: "mine".to_string(),
        created_at: clock::from_millis(10),
        updated_at: clock::from_millis(10),
        is_deleted: false,
    }
}

#[tokio::test]
async fn expired_access_token_is_refreshed_once() {
    let (url, script) = spawn_server("fresh").await;
    let (client, repo) = stale_client(&url);
    repo.insert(&local_record()).unwrap();

    let engine = SyncEngine::new(client, repo.clone());
    let report = engine.run_once().await.unwrap();

    assert_eq!(report.pushed, 1);
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.last_sync_calls.load(Ordering::SeqCst), 2);
    assert_eq!(script.item_calls.load(Ordering::SeqCst), 1);

    let tokens = engine.remote().tokens().load().unwrap();
    assert_eq!(tokens.access_token, "fresh");
    assert_eq!(tokens.refresh_token, "refresh-2");
}

#[tokio::test]
async fn second_rejection_aborts_the_run() {
    let (url, script) = spawn_server("still-bad").await;
    let (client, repo) = stale_client(&url);
    repo.insert(&local_record()).unwrap();
    let before = repo.list_changed_since(clock::epoch()).unwrap();

    let engine = SyncEngine::new(client, repo.clone());
    let result = engine.run_once().await;

    assert!(matches!(result, Err(KeeperError::NotAuthenticated)));
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.last_sync_calls.load(Ordering::SeqCst), 2);
    assert_eq!(script.item_calls.load(Ordering::SeqCst), 0);

    assert_eq!(repo.list_changed_since(clock::epoch()).unwrap(), before);
    assert!(repo.last_synced_at().unwrap().is_none());
}

#[tokio::test]
async fn rejected_refresh_token_is_not_authenticated() {
    let (url, script) = spawn_server("fresh").await;
    let (client, _repo) = stale_client(&url);
    client
        .tokens()
        .save(&AuthTokenPair {
            access_token: "stale".to_string(),
            refresh_token: "revoked".to_string(),
        })
        .unwrap();

    let result = client.save_items(&[]).await;

    assert!(matches!(result, Err(KeeperError::NotAuthenticated)));
    assert_eq!(script.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.item_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    // Bind and drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, _repo) = stale_client(&format!("http://{}", addr));
    assert!(matches!(
        client.fetch_last_sync().await,
        Err(KeeperError::Network(_))
    ));
}
