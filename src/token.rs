//! Bearer token codec.
//!
//! Tokens are HS256 JWTs signed with the current secret from the [`SaltStore`].
//! Verification falls back to the previous secret, so tokens minted just before a
//! rotation stay valid until their own expiry.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::TokenError,
    models::{TokenResponse, User},
    salt::SaltStoreState,
};

/// Distinguishes short-lived access tokens from refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// TokenClaims
///
/// Payload carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenClaims {
    pub email: String,
    pub user_uuid: Uuid,
    pub user_id: i64,
    pub roles: Vec<String>,
    pub kind: TokenKind,
    /// Issued at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expires at, seconds since the Unix epoch. Invalid from this instant on.
    pub exp: i64,
}

/// TokenSubject
///
/// Who a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: i64,
    pub user_uuid: Uuid,
    pub email: String,
    pub roles: Vec<String>,
}

impl TokenSubject {
    pub fn new(user: &User, roles: Vec<String>) -> Self {
        Self {
            user_id: user.id,
            user_uuid: user.uuid,
            email: user.email.clone(),
            roles,
        }
    }
}

impl From<&TokenClaims> for TokenSubject {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            user_uuid: claims.user_uuid,
            email: claims.email.clone(),
            roles: claims.roles.clone(),
        }
    }
}

/// TokenCodec
///
/// Issues and verifies tokens. Cheap to clone; the secrets are shared with the rotator.
#[derive(Clone)]
pub struct TokenCodec {
    salts: SaltStoreState,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(salts: SaltStoreState, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            salts,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Signs a token of `kind` for `subject` with the current secret.
    pub fn issue(
        &self,
        subject: &TokenSubject,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        // Whole seconds: the validity window is [iat, iat + ttl).
        let iat = now.timestamp();
        let claims = TokenClaims {
            email: subject.email.clone(),
            user_uuid: subject.user_uuid,
            user_id: subject.user_id,
            roles: subject.roles.clone(),
            kind,
            iat,
            exp: iat + self.ttl(kind).num_seconds(),
        };

        let secret = self.salts.snapshot();
        let key = EncodingKey::from_secret(secret.current.as_bytes());
        encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(|e| {
            tracing::error!("token encoding failed: {:?}", e);
            TokenError::Malformed
        })
    }

    /// Signs a fresh access + refresh pair.
    pub fn issue_pair(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, TokenError> {
        Ok(TokenResponse {
            access_token: self.issue(subject, TokenKind::Access, now)?,
            refresh_token: self.issue(subject, TokenKind::Refresh, now)?,
        })
    }

    /// Verifies a token of the expected kind against the wall clock.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, expected, Utc::now())
    }

    /// verify_at
    ///
    /// Checks, in order: structure, signature (current, then previous secret),
    /// expiry, kind.
    pub fn verify_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_any_at(token, now)?;
        if claims.kind != expected {
            return Err(TokenError::KindMismatch {
                expected,
                found: claims.kind,
            });
        }
        Ok(claims)
    }

    /// Verifies structure, signature and expiry, accepting either kind.
    pub fn decode_any_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let secrets = self.salts.snapshot();
        let claims = match decode_with(token, &secrets.current) {
            Err(TokenError::SignatureInvalid) => decode_with(token, &secrets.previous)?,
            other => other?,
        };

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// Decodes and checks the signature only. Expiry is checked by the caller against
/// an explicit clock.
fn decode_with(token: &str, secret: &str) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;

    let key = DecodingKey::from_secret(secret.as_bytes());
    match decode::<TokenClaims>(token, &key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::InvalidSignature => Err(TokenError::SignatureInvalid),
            _ => Err(TokenError::Malformed),
        },
    }
}
