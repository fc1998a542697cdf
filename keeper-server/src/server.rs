//! Axum router setup.

use crate::auth::{auth_middleware, TokenIssuer};
use crate::config::ServerConfig;
use crate::handlers::{auth, sync};
use crate::storage::ServerStorage;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: ServerStorage,
    pub issuer: TokenIssuer,
}

impl AppState {
    pub fn new(storage: ServerStorage, config: &ServerConfig) -> Self {
        Self {
            storage,
            issuer: TokenIssuer::from_config(config),
        }
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    // Authenticated routes
    let authenticated = Router::new()
        .route("/api/v1/sync/last-sync", get(sync::last_sync))
        .route("/api/v1/sync/items", post(sync::save_items))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Unauthenticated routes
    let public = Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/health", get(health));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.max_payload_size))
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
