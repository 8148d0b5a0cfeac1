//! Grant-type dispatch for the login endpoint.
//!
//! `authorization_code` exchanges an email and password for a token pair,
//! `refresh_token` trades a refresh token for a new access token, and
//! `token_decode` returns the claims of a token to a caller that already holds a
//! valid access token.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha512};
use utoipa::ToSchema;

use crate::{
    error::{LoginError, TokenError},
    models::{LoginRequest, TokenResponse},
    repository::RepositoryState,
    token::{TokenClaims, TokenCodec, TokenKind, TokenSubject},
};

/// GrantType
///
/// The closed set of login sub-protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    TokenDecode,
}

impl TryFrom<&str> for GrantType {
    type Error = LoginError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            "token_decode" => Ok(GrantType::TokenDecode),
            other => Err(LoginError::UnsupportedGrant(other.to_string())),
        }
    }
}

/// LoginOutcome
///
/// Serialized untagged: either the token pair or the decoded claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginOutcome {
    Tokens(TokenResponse),
    Decoded(TokenClaims),
}

/// Tokens presented in request headers rather than the body.
#[derive(Debug, Clone, Default)]
pub struct HeaderTokens {
    /// `X-APP-TOKEN`
    pub app_token: Option<String>,
    /// `X-REFRESH-TOKEN`
    pub refresh_token: Option<String>,
}

/// SHA-512 of `password || salt`, hex encoded.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// LoginService
///
/// Produces and validates tokens for the login and checklogin endpoints.
#[derive(Clone)]
pub struct LoginService {
    repo: RepositoryState,
    codec: TokenCodec,
    password_salt: Arc<str>,
}

impl LoginService {
    pub fn new(repo: RepositoryState, codec: TokenCodec, password_salt: &str) -> Self {
        Self {
            repo,
            codec,
            password_salt: Arc::from(password_salt),
        }
    }

    pub async fn login(
        &self,
        request: LoginRequest,
        headers: &HeaderTokens,
    ) -> Result<LoginOutcome, LoginError> {
        self.login_at(request, headers, Utc::now()).await
    }

    /// login_at
    ///
    /// Dispatches on `grant_type`. A missing grant type is a malformed request; an
    /// unknown one is an unsupported grant. Both map to 400.
    pub async fn login_at(
        &self,
        request: LoginRequest,
        headers: &HeaderTokens,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, LoginError> {
        let grant = request
            .grant_type
            .as_deref()
            .ok_or(LoginError::MissingField("grant_type"))?;

        match GrantType::try_from(grant)? {
            GrantType::AuthorizationCode => {
                let email = required(request.email, "email")?;
                let password = required(request.password, "password")?;
                self.authorization_code(&email, &password, now)
                    .await
                    .map(LoginOutcome::Tokens)
            }
            GrantType::RefreshToken => {
                // The body token wins; X-REFRESH-TOKEN is the fallback channel.
                let token = required(request.token.or(headers.refresh_token.clone()), "token")?;
                self.refresh(&token, now).map(LoginOutcome::Tokens)
            }
            GrantType::TokenDecode => {
                let header_token = headers.app_token.as_deref();
                let token = required(request.token, "token")?;
                self.decode(&token, header_token, now).map(LoginOutcome::Decoded)
            }
        }
    }

    async fn authorization_code(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, LoginError> {
        let Some(user) = self.repo.find_user_by_email(email).await? else {
            tracing::info!(email = %email, "Login rejected: unknown email");
            return Err(LoginError::CredentialInvalid);
        };

        let supplied = hash_password(password, &self.password_salt);
        if !constant_time_eq(supplied.as_bytes(), user.password_hash.as_bytes()) {
            tracing::info!(email = %email, "Login rejected: password mismatch");
            return Err(LoginError::CredentialInvalid);
        }
        if user.disabled {
            tracing::info!(email = %email, "Login rejected: account disabled");
            return Err(LoginError::CredentialInvalid);
        }

        let roles = self.repo.user_role_names(user.id).await?;
        let subject = TokenSubject::new(&user, roles);
        let tokens = self.codec.issue_pair(&subject, now)?;
        tracing::info!(email = %email, roles = ?subject.roles, "Token pair issued");
        Ok(tokens)
    }

    /// Mints a new access token from a refresh token. The refresh token itself is
    /// handed back unchanged; it is not reissued.
    fn refresh(&self, token: &str, now: DateTime<Utc>) -> Result<TokenResponse, LoginError> {
        let claims = self.codec.verify_at(token, TokenKind::Refresh, now)?;
        let subject = TokenSubject::from(&claims);
        let access_token = self.codec.issue(&subject, TokenKind::Access, now)?;
        tracing::debug!(email = %claims.email, "Access token refreshed");
        Ok(TokenResponse {
            access_token,
            refresh_token: token.to_string(),
        })
    }

    /// Returns the claims of `token` (either kind). The caller must also present a
    /// valid access token in the header.
    fn decode(
        &self,
        token: &str,
        header_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, LoginError> {
        let header_token = header_token.ok_or(TokenError::Malformed)?;
        self.codec.verify_at(header_token, TokenKind::Access, now)?;
        Ok(self.codec.decode_any_at(token, now)?)
    }

    /// Validates the header access token for the checklogin probe.
    pub fn check_login(&self, header_token: Option<&str>) -> Result<TokenClaims, TokenError> {
        let token = header_token.ok_or(TokenError::Malformed)?;
        self.codec.verify(token, TokenKind::Access)
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, LoginError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LoginError::MissingField(field)),
    }
}
