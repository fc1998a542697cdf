//! HTTP client for the keeper sync server.

use crate::crypto::Salt;
use crate::models::{AuthTokenPair, LastSync, SecretRecord};
use crate::store::TokenStore;
use crate::sync::engine::RemoteVault;
use crate::sync::models::{AuthResponse, Credentials, ErrorBody, RefreshRequest};
use crate::{KeeperError, Result};
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const REGISTER_PATH: &str = "/api/v1/auth/register";
pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";
pub const LAST_SYNC_PATH: &str = "/api/v1/sync/last-sync";
pub const ITEMS_PATH: &str = "/api/v1/sync/items";

/// HTTP client for the sync server.
///
/// Tokens live in the local database so a scheduled sync and the CLI see the
/// same pair.
pub struct SyncClient {
    client: reqwest::Client,
    server_url: String,
    tokens: TokenStore,
}

impl SyncClient {
    pub fn new(server_url: &str, timeout: Duration, tokens: TokenStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(network)?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Create an account. Stores the issued tokens and returns the account salt.
    pub async fn register(&self, credentials: &Credentials) -> Result<Salt> {
        credentials.validate()?;
        let response: AuthResponse = self.public_post(REGISTER_PATH, credentials).await?;
        info!(login = %credentials.login, "Registered account");
        self.accept(response)
    }

    /// Log in to an existing account. Stores the issued tokens and returns the account salt.
    pub async fn login(&self, credentials: &Credentials) -> Result<Salt> {
        credentials.validate()?;
        let response: AuthResponse = self.public_post(LOGIN_PATH, credentials).await?;
        info!(login = %credentials.login, "Logged in");
        self.accept(response)
    }

    /// Trade the stored refresh token for a new pair.
    pub async fn refresh(&self) -> Result<()> {
        let current = self.tokens.load()?;
        let request = RefreshRequest {
            token: current.refresh_token,
        };
        let response: AuthResponse = match self.public_post(REFRESH_PATH, &request).await {
            Err(KeeperError::Remote { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                warn!("Refresh token rejected");
                return Err(KeeperError::NotAuthenticated);
            }
            other => other?,
        };
        debug!("Refreshed token pair");
        self.accept(response).map(|_| ())
    }

    pub async fn fetch_last_sync(&self) -> Result<DateTime<Utc>> {
        let body: LastSync = self
            .authorized::<(), _>(Method::GET, LAST_SYNC_PATH, None)
            .await?;
        Ok(body.updated_at)
    }

    pub async fn save_items(&self, items: &[SecretRecord]) -> Result<Vec<SecretRecord>> {
        self.authorized(Method::POST, ITEMS_PATH, Some(items)).await
    }

    fn accept(&self, response: AuthResponse) -> Result<Salt> {
        let salt = Salt::from_hex(&response.salt)?;
        self.tokens.save(&AuthTokenPair {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        })?;
        Ok(salt)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    async fn public_post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(network)?;
        read_json(resp).await
    }

    /// Send with the access token. A 401 triggers one refresh and one replay;
    /// a second 401 ends with `NotAuthenticated`.
    async fn authorized<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let mut refreshed = false;

        loop {
            let tokens = self.tokens.load()?;
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&tokens.access_token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let resp = request.send().await.map_err(network)?;
            if resp.status() != StatusCode::UNAUTHORIZED {
                return read_json(resp).await;
            }

            if refreshed {
                warn!(path, "Access token rejected after refresh");
                return Err(KeeperError::NotAuthenticated);
            }
            debug!(path, "Access token rejected, refreshing");
            self.refresh().await?;
            refreshed = true;
        }
    }
}

impl RemoteVault for SyncClient {
    fn last_sync(&self) -> impl Future<Output = Result<DateTime<Utc>>> + Send {
        self.fetch_last_sync()
    }

    fn push_items(
        &self,
        items: &[SecretRecord],
    ) -> impl Future<Output = Result<Vec<SecretRecord>>> + Send {
        self.save_items(items)
    }
}

fn network(e: reqwest::Error) -> KeeperError {
    KeeperError::Network(e.to_string())
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        return Err(KeeperError::Remote {
            status: status.as_u16(),
            message,
        });
    }

    resp.json().await.map_err(network)
}
