//! Token issuance, bearer-token middleware and account password hashing.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::server::AppState;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The authenticated caller, taken from a validated access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub device_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    pub did: i64,
    pub typ: TokenKind,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Keeps two tokens minted in the same second distinct.
    pub jti: String,
}

pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        secret: &[u8],
        issuer: &str,
        audience: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let secret = match &config.jwt_secret {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                tracing::warn!("No jwt_secret configured, tokens will not survive a restart");
                let mut random = vec![0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut random);
                random
            }
        };
        Self::new(
            &secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            Duration::minutes(config.access_token_minutes),
            Duration::hours(config.refresh_token_hours),
        )
    }

    pub fn issue(&self, identity: Identity) -> Result<IssuedTokens, ServerError> {
        let now = Utc::now();
        let access_token = self.sign(identity, TokenKind::Access, now, now + self.access_ttl)?;
        let refresh_expires_at = now + self.refresh_ttl;
        let refresh_token = self.sign(identity, TokenKind::Refresh, now, refresh_expires_at)?;
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            refresh_expires_at,
        })
    }

    /// Check signature, issuer, audience, expiry and token kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Identity, ServerError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| ServerError::Unauthorized(format!("Invalid token: {}", e)))?;

        if data.claims.typ != expected {
            return Err(ServerError::Unauthorized("Wrong token type".to_string()));
        }
        Ok(Identity {
            user_id: data.claims.uid,
            device_id: data.claims.did,
        })
    }

    fn sign(
        &self,
        identity: Identity,
        typ: TokenKind,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ServerError> {
        let claims = Claims {
            uid: identity.user_id,
            did: identity.device_id,
            typ,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ServerError::Internal(format!("Token signing failed: {}", e)))
    }
}

/// Refresh tokens are stored by digest only.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Auth middleware: validates the bearer access token and attaches the [`Identity`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let identity = {
        let token = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".to_string()))?;
        state.issuer.verify(token, TokenKind::Access)?
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
