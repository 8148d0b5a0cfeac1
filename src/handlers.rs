use crate::{
    auth::{APP_TOKEN_HEADER, AuthUser, REFRESH_TOKEN_HEADER},
    error::{LoginError, MatrixLoadError},
    login::{HeaderTokens, LoginOutcome, LoginService},
    matrix::{MatrixHandle, MatrixLoader, MatrixScope},
    models::{
        ApiResponse, AppMatrixResponse, LoginRequest, MatrixReloadResponse, SaltResponse,
        UserProfile,
    },
    repository::RepositoryState,
    salt::SaltStoreState,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use uuid::Uuid;

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

// --- Handlers ---

/// login
///
/// [Allow-listed Route] Single entry point for the three grant types. On success
/// answers `202 Accepted` with either a token pair or, for `token_decode`, the
/// decoded claims.
///
/// *Headers*: `X-APP-TOKEN` authenticates `token_decode`; `X-REFRESH-TOKEN` is read
/// by `refresh_token` when the body carries no token.
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 202, description = "Tokens issued or decoded", body = ApiResponse<LoginOutcome>),
        (status = 400, description = "Missing field or unsupported grant type"),
        (status = 401, description = "Invalid credentials or token"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn login(
    State(service): State<LoginService>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<LoginOutcome>>), LoginError> {
    let Json(request) = payload.map_err(|e| LoginError::InvalidBody(e.body_text()))?;
    let header_tokens = HeaderTokens {
        app_token: header_value(&headers, APP_TOKEN_HEADER),
        refresh_token: header_value(&headers, REFRESH_TOKEN_HEADER),
    };

    let outcome = service.login(request, &header_tokens).await.map_err(|e| {
        tracing::info!("Login failed: {}", e);
        e
    })?;

    let details = match outcome {
        LoginOutcome::Tokens(_) => "Login successful",
        LoginOutcome::Decoded(_) => "Token decoded",
    };
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(outcome, details))))
}

/// check_login
///
/// [Allow-listed Route] Session probe. `202` when `X-APP-TOKEN` holds a valid access
/// token, `403` otherwise. No body either way.
#[utoipa::path(
    get,
    path = "/api/v1/checklogin",
    responses(
        (status = 202, description = "Session valid"),
        (status = 403, description = "Session missing or invalid")
    )
)]
pub async fn check_login(State(service): State<LoginService>, headers: HeaderMap) -> StatusCode {
    let token = header_value(&headers, APP_TOKEN_HEADER);
    match service.check_login(token.as_deref()) {
        Ok(_) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::debug!("checklogin rejected: {}", e);
            StatusCode::FORBIDDEN
        }
    }
}

/// get_jwt_salts
///
/// [Matrix-gated Route] Returns both signing secrets so a peer service can verify
/// tokens itself, including those signed just before the last rotation.
#[utoipa::path(
    get,
    path = "/api/v1/jwtsalt",
    responses(
        (status = 200, description = "Current and previous signing secrets", body = ApiResponse<SaltResponse>),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn get_jwt_salts(State(salts): State<SaltStoreState>) -> Json<ApiResponse<SaltResponse>> {
    let pair = salts.snapshot();
    Json(ApiResponse::ok(
        SaltResponse {
            current_secret: pair.current.clone(),
            previous_secret: pair.previous.clone(),
        },
        "Signing secrets",
    ))
}

/// reload_matrix
///
/// [Matrix-gated Route] Rebuilds the global matrix from the store and installs it
/// atomically. In-flight requests finish against the snapshot they started with.
/// On a store failure the running matrix stays in place.
#[utoipa::path(
    post,
    path = "/api/v1/matrix/reload",
    responses(
        (status = 200, description = "Matrix reloaded", body = ApiResponse<MatrixReloadResponse>),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Store failure; previous matrix kept")
    )
)]
pub async fn reload_matrix(
    State(repo): State<RepositoryState>,
    State(matrix): State<MatrixHandle>,
) -> Result<Json<ApiResponse<MatrixReloadResponse>>, MatrixLoadError> {
    let fresh = MatrixLoader::new(repo).load(MatrixScope::Global).await?;
    let entries = fresh.len();
    matrix.replace(fresh);
    tracing::info!(entries, "Permission matrix replaced");
    Ok(Json(ApiResponse::ok(
        MatrixReloadResponse { entries },
        "Permission matrix reloaded",
    )))
}

/// get_app_matrix
///
/// [Matrix-gated Route] The matrix built from a single tenant app. Never installed
/// into the gateway. An unknown or inactive app yields an empty map.
#[utoipa::path(
    get,
    path = "/api/v1/appmatrix/{app_uuid}",
    params(("app_uuid" = Uuid, Path, description = "Tenant app uuid")),
    responses(
        (status = 200, description = "Tenant-scoped matrix", body = ApiResponse<AppMatrixResponse>),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn get_app_matrix(
    State(repo): State<RepositoryState>,
    Path(app_uuid): Path<Uuid>,
) -> Result<Json<ApiResponse<AppMatrixResponse>>, MatrixLoadError> {
    let matrix = MatrixLoader::new(repo)
        .load(MatrixScope::App(app_uuid))
        .await?;
    Ok(Json(ApiResponse::ok(
        AppMatrixResponse {
            app_uuid,
            entries: matrix.entries().clone(),
        },
        "Application permission matrix",
    )))
}

/// get_me
///
/// [Matrix-gated Route] Echoes the identity the gateway verified for this request.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Verified identity", body = ApiResponse<UserProfile>),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn get_me(user: AuthUser) -> Json<ApiResponse<UserProfile>> {
    Json(ApiResponse::ok(UserProfile::from(user), "Current user"))
}

/// health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}
