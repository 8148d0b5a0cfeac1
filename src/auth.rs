use axum::{
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::DenyReason,
    matrix::{ANONYMOUS_ROLE, MatrixHandle, RouteIdentity, is_allow_listed},
    models::UserProfile,
    token::{TokenClaims, TokenCodec, TokenKind},
};

/// Header carrying the access token (and the header token of the login flows).
pub const APP_TOKEN_HEADER: &str = "x-app-token";
/// Secondary channel for refresh tokens.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// AuthUser
///
/// The verified identity of a request, attached by the gateway after a successful
/// check. Handlers take it as an argument to learn who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub uuid: Uuid,
    pub email: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl From<TokenClaims> for AuthUser {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            uuid: claims.user_uuid,
            email: claims.email,
            roles: claims.roles,
        }
    }
}

impl From<AuthUser> for UserProfile {
    fn from(user: AuthUser) -> Self {
        Self {
            user_id: user.user_id,
            uuid: user.uuid,
            email: user.email,
            roles: user.roles,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Reads the identity the gateway stored in the request extensions. A handler on a
/// route that was not registered through the gateway (or an allow-listed one) gets
/// no identity and the request is rejected with 403.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(StatusCode::FORBIDDEN)
    }
}

/// Access
///
/// Outcome of a successful gateway check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// The path is allow-listed; no token was looked at.
    Bypass,
    /// The token verified and carries the role the route requires.
    Granted(AuthUser),
}

/// AuthGateway
///
/// Per-request authorization over the token codec and the live matrix. Performs no
/// I/O and never writes either.
#[derive(Clone)]
pub struct AuthGateway {
    codec: TokenCodec,
    matrix: MatrixHandle,
}

impl AuthGateway {
    pub fn new(codec: TokenCodec, matrix: MatrixHandle) -> Self {
        Self { codec, matrix }
    }

    /// check
    ///
    /// 1. allow-listed path → bypass
    /// 2. token from `X-APP-TOKEN`, verified as an access token
    /// 3. route identity looked up in the matrix; missing → deny
    /// 4. `Anonymous` → allow, otherwise the token's roles must include the required one
    pub fn check(
        &self,
        path: &str,
        route: &RouteIdentity,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Access, DenyReason> {
        if is_allow_listed(path) {
            return Ok(Access::Bypass);
        }

        let token = token.ok_or(DenyReason::MissingToken)?;
        let claims = self.codec.verify_at(token, TokenKind::Access, now)?;

        let matrix = self.matrix.snapshot();
        let required = matrix
            .required_role(route)
            .ok_or_else(|| DenyReason::MatrixMiss(route.key()))?;

        let user = AuthUser::from(claims);
        if required != ANONYMOUS_ROLE && !user.has_role(required) {
            return Err(DenyReason::RoleInsufficient {
                route: route.key(),
                required: required.to_string(),
            });
        }

        Ok(Access::Granted(user))
    }
}

/// RouteGuard
///
/// Middleware state for one registered route: the gateway plus the stable name the
/// route was registered under.
#[derive(Clone)]
pub struct RouteGuard {
    gateway: AuthGateway,
    name: &'static str,
}

impl RouteGuard {
    pub fn new(gateway: AuthGateway, name: &'static str) -> Self {
        Self { gateway, name }
    }
}

/// authorize
///
/// Gateway middleware, layered onto every route registered through
/// `routes::GuardedRouter`. Denials all render the same 403; the reason only
/// reaches the logs.
pub async fn authorize(
    State(guard): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let route = RouteIdentity::from_method(guard.name, request.method());

    // Nested routers see a stripped URI; the allow-list is written against full paths.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let token = request
        .headers()
        .get(APP_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    let decision = guard.gateway.check(&path, &route, token, Utc::now());

    match decision {
        Ok(Access::Bypass) => next.run(request).await,
        Ok(Access::Granted(user)) => {
            tracing::debug!(route = %route, user = %user.email, "Request authorized");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(reason) => {
            tracing::warn!(route = %route, path = %path, reason = %reason, "Request denied");
            reason.into_response()
        }
    }
}
