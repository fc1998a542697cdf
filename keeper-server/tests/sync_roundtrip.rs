//! Two client devices syncing through a real server instance.

use keeper_core::sync::{Credentials, SyncClient, SyncEngine};
use keeper_core::{
    AuthTokenPair, Database, KeeperError, KeyEnvelopeStore, SecretPayload, SecretRepository,
    TokenStore, VaultService,
};
use keeper_server::{build_router, AppState, ServerConfig, ServerStorage};
use std::time::Duration;
use tempfile::TempDir;

const PASSWORD: &str = "hunter22";

struct Device {
    vault: VaultService,
    engine: SyncEngine<SyncClient>,
    _dir: TempDir,
}

impl Device {
    fn new(url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap().shared();
        let repo = SecretRepository::new(db.clone());
        let client = SyncClient::new(url, Duration::from_secs(10), TokenStore::new(db)).unwrap();
        let envelope = KeyEnvelopeStore::new(dir.path().join("keystore.json"));

        Self {
            vault: VaultService::new(repo.clone(), envelope),
            engine: SyncEngine::new(client, repo),
            _dir: dir,
        }
    }

    fn credentials(device: &str) -> Credentials {
        Credentials {
            login: "alice".to_string(),
            password: PASSWORD.to_string(),
            device: device.to_string(),
        }
    }

    async fn register(url: &str, name: &str) -> Self {
        let device = Self::new(url);
        let salt = device
            .engine
            .remote()
            .register(&Self::credentials(name))
            .await
            .unwrap();
        device
            .vault
            .envelope()
            .derive_and_save(PASSWORD.as_bytes(), &salt)
            .unwrap();
        device
    }

    async fn login(url: &str, name: &str) -> Self {
        let device = Self::new(url);
        let salt = device
            .engine
            .remote()
            .login(&Self::credentials(name))
            .await
            .unwrap();
        device
            .vault
            .envelope()
            .derive_and_save(PASSWORD.as_bytes(), &salt)
            .unwrap();
        device
    }
}

async fn spawn_server() -> String {
    let config = ServerConfig {
        jwt_secret: Some("integration-secret".to_string()),
        ..ServerConfig::default()
    };
    let state = AppState::new(ServerStorage::in_memory().unwrap(), &config);
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Watermarks have millisecond resolution; keep writes on distinct ticks.
async fn next_tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn secrets_travel_between_devices() {
    let url = spawn_server().await;
    let laptop = Device::register(&url, "laptop").await;
    let phone = Device::login(&url, "phone").await;

    let added = laptop
        .vault
        .add("note", &SecretPayload::Text("hello".to_string()))
        .unwrap();
    let report = laptop.engine.run_once().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.received, 0);

    let report = phone.engine.run_once().await.unwrap();
    assert_eq!(report.received, 1);
    assert_eq!(report.applied, 1);
    let copy = phone.vault.get(&added.uid).unwrap();
    assert_eq!(copy.payload, SecretPayload::Text("hello".to_string()));
    assert_eq!(copy.description, "note");

    next_tick().await;
    laptop
        .vault
        .update(&added.uid, None, &SecretPayload::Text("hello again".to_string()))
        .unwrap();
    laptop.engine.run_once().await.unwrap();
    phone.engine.run_once().await.unwrap();
    assert_eq!(
        phone.vault.get(&added.uid).unwrap().payload,
        SecretPayload::Text("hello again".to_string())
    );

    let quiet = phone.engine.run_once().await.unwrap();
    assert_eq!(quiet.pushed, 0);
    assert_eq!(quiet.received, 0);
}

#[tokio::test]
async fn deletion_propagates() {
    let url = spawn_server().await;
    let laptop = Device::register(&url, "laptop").await;
    let phone = Device::login(&url, "phone").await;

    let added = laptop
        .vault
        .add("doomed", &SecretPayload::Text("bye".to_string()))
        .unwrap();
    laptop.engine.run_once().await.unwrap();
    phone.engine.run_once().await.unwrap();
    assert!(phone.vault.get(&added.uid).is_ok());

    next_tick().await;
    phone.vault.delete(&added.uid).unwrap();
    phone.engine.run_once().await.unwrap();
    laptop.engine.run_once().await.unwrap();

    assert!(matches!(
        laptop.vault.get(&added.uid),
        Err(KeeperError::NotFound(_))
    ));
    assert!(laptop.vault.list().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_registration_and_bad_password_are_rejected() {
    let url = spawn_server().await;
    let _laptop = Device::register(&url, "laptop").await;

    let other = Device::new(&url);
    let err = other
        .engine
        .remote()
        .register(&Device::credentials("phone"))
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::Remote { status: 409, .. }));

    let wrong = Credentials {
        password: "not-the-password".to_string(),
        ..Device::credentials("phone")
    };
    let err = other.engine.remote().login(&wrong).await.unwrap_err();
    assert!(matches!(err, KeeperError::Remote { status: 401, .. }));
}

#[tokio::test]
async fn refresh_rotates_and_revokes_previous_token() {
    let url = spawn_server().await;
    let laptop = Device::register(&url, "laptop").await;
    let client = laptop.engine.remote();

    let original = client.tokens().load().unwrap();
    client.refresh().await.unwrap();
    let rotated = client.tokens().load().unwrap();
    assert_ne!(rotated.refresh_token, original.refresh_token);

    // The rotated pair still works.
    laptop.engine.run_once().await.unwrap();

    client
        .tokens()
        .save(&AuthTokenPair {
            access_token: "garbage".to_string(),
            refresh_token: original.refresh_token,
        })
        .unwrap();
    assert!(matches!(
        laptop.engine.run_once().await,
        Err(KeeperError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn sync_requires_a_bearer_token() {
    let url = spawn_server().await;
    let device = Device::new(&url);
    assert!(matches!(
        device.engine.run_once().await,
        Err(KeeperError::NotAuthenticated)
    ));
}
