//! Account registration, login and token refresh handlers.

use crate::auth::{
    hash_password, token_digest, verify_password, Identity, IssuedTokens, TokenKind,
};
use crate::error::ServerError;
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use keeper_core::crypto::generate_salt;
use keeper_core::sync::{AuthResponse, Credentials, RefreshRequest};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    req.validate()?;

    let password = req.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("Hashing task failed: {}", e)))??;
    let salt = generate_salt()
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .to_hex();

    let issuer = &state.issuer;
    let tokens = state.storage.create_account(
        &req.login,
        &password_hash,
        &salt,
        &req.device,
        |identity| {
            tracing::info!(
                user_id = identity.user_id,
                device_id = identity.device_id,
                "Registering account"
            );
            issuer.issue(identity)
        },
    )?;

    Ok((StatusCode::CREATED, Json(respond(tokens, salt))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<Json<AuthResponse>, ServerError> {
    req.validate()?;

    let rejected = || ServerError::Unauthorized("invalid login or password".to_string());
    let user = state.storage.find_user(&req.login)?.ok_or_else(rejected)?;

    let password = req.password.clone();
    let stored_hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ServerError::Internal(format!("Verification task failed: {}", e)))?;
    if !valid {
        tracing::warn!(user_id = user.user_id, "Failed login attempt");
        return Err(rejected());
    }

    let device_id = state.storage.ensure_device(user.user_id, &req.device)?;
    let identity = Identity {
        user_id: user.user_id,
        device_id,
    };
    Ok(Json(issue(&state, identity, user.salt)?))
}

/// Exchange the device's current refresh token for a new pair.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let identity = state.issuer.verify(&req.token, TokenKind::Refresh)?;

    let tokens = state.issuer.issue(identity)?;
    let rotated = state.storage.rotate_refresh_token(
        identity,
        &token_digest(&req.token),
        &token_digest(&tokens.refresh_token),
        tokens.refresh_expires_at,
    )?;
    if !rotated {
        tracing::warn!(
            user_id = identity.user_id,
            device_id = identity.device_id,
            "Refresh token is not the current one"
        );
        return Err(ServerError::Unauthorized(
            "Refresh token revoked".to_string(),
        ));
    }

    let salt = state.storage.user_salt(identity.user_id)?;
    Ok(Json(respond(tokens, salt)))
}

/// Mint a token pair and make its refresh token the only valid one for the device.
fn issue(state: &AppState, identity: Identity, salt: String) -> Result<AuthResponse, ServerError> {
    let tokens = state.issuer.issue(identity)?;
    state.storage.store_refresh_token(
        identity.device_id,
        &token_digest(&tokens.refresh_token),
        tokens.refresh_expires_at,
    )?;
    Ok(respond(tokens, salt))
}

fn respond(tokens: IssuedTokens, salt: String) -> AuthResponse {
    AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        salt,
    }
}
