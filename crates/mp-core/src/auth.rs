//! Bearer tokens for marketplace users. Moderators use cookie sessions in
//! the admin API instead.

use anyhow::{anyhow, Result};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub secret: String,
    pub ttl_seconds: u64,
}

impl JwtConfig {
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation
    }
}

/// `sub` is the user id. Roles are not embedded: they are re-read on every
/// request so a revocation applies to tokens already handed out.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

pub struct IssuedToken {
    pub token: String,
    pub claims: AccessTokenClaims,
}

impl IssuedToken {
    pub fn expires_at(&self) -> i64 {
        i64::try_from(self.claims.exp).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

pub fn issue_token(user_id: &str, config: &JwtConfig) -> Result<IssuedToken> {
    let issued_at = now_seconds()?;
    let expires_at = issued_at
        .checked_add(config.ttl_seconds)
        .ok_or_else(|| anyhow!("token expiry overflow"))?;
    let claims = AccessTokenClaims {
        sub: user_id.to_string(),
        exp: expires_at,
        iat: issued_at,
        jti: Uuid::new_v4().to_string(),
        aud: config.audience.clone(),
        iss: config.issuer.clone(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;
    Ok(IssuedToken { token, claims })
}

pub fn verify_token(token: &str, config: &JwtConfig) -> Result<AccessTokenClaims, TokenError> {
    decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &config.validation(),
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid(err),
    })
}

fn now_seconds() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|_| anyhow!("system clock is before the unix epoch"))
}
