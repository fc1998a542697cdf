//! Sync handlers: watermark lookup and the push/receive exchange.

use crate::auth::Identity;
use crate::error::ServerError;
use crate::server::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use keeper_core::models::{LastSync, SecretRecord};

pub async fn last_sync(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<LastSync>, ServerError> {
    let updated_at = state.storage.device_last_sync(identity)?;
    Ok(Json(LastSync { updated_at }))
}

pub async fn save_items(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(records): Json<Vec<SecretRecord>>,
) -> Result<Json<Vec<SecretRecord>>, ServerError> {
    let outcome = state.storage.save_items(identity, &records)?;
    Ok(Json(outcome.outbound))
}
