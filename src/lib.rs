use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authentication and authorization core.
pub mod auth;
pub mod login;
pub mod matrix;
pub mod salt;
pub mod token;

// Supporting services and components.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// Route registration (public, gateway-protected).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::AuthGateway;
pub use config::AppConfig;
pub use login::LoginService;
pub use matrix::{MatrixHandle, PermissionMatrix};
pub use repository::{MockRepository, PostgresRepository, RepositoryState};
pub use salt::{SaltRotator, SaltStore, SaltStoreState};
pub use token::TokenCodec;

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers, served at
/// `/api-docs/openapi.json` and rendered by Swagger UI at `/docs`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::check_login, handlers::get_jwt_salts,
        handlers::reload_matrix, handlers::get_app_matrix, handlers::get_me,
        handlers::health
    ),
    components(
        schemas(
            models::LoginRequest, models::TokenResponse, models::SaltResponse,
            models::MatrixReloadResponse, models::AppMatrixResponse, models::UserProfile,
            token::TokenClaims, token::TokenKind, login::LoginOutcome,
        )
    ),
    tags(
        (name = "rolegate", description = "Token issuance and route-level authorization")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of services. Everything mutable inside it (signing
/// secrets, the live matrix) sits behind an atomic snapshot cell, so the state
/// itself is cloned freely per request.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
    pub salts: SaltStoreState,
    pub codec: TokenCodec,
    pub matrix: MatrixHandle,
    pub gateway: AuthGateway,
    pub login: LoginService,
}

impl AppState {
    /// Wires the codec, gateway and login service from their shared parts.
    pub fn new(
        repo: RepositoryState,
        config: AppConfig,
        salts: SaltStoreState,
        matrix: MatrixHandle,
    ) -> Self {
        let codec = TokenCodec::new(salts.clone(), config.access_ttl(), config.refresh_ttl());
        let gateway = AuthGateway::new(codec.clone(), matrix.clone());
        let login = LoginService::new(repo.clone(), codec.clone(), &config.password_salt);
        Self {
            repo,
            config,
            salts,
            codec,
            matrix,
            gateway,
            login,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for SaltStoreState {
    fn from_ref(app_state: &AppState) -> SaltStoreState {
        app_state.salts.clone()
    }
}

impl FromRef<AppState> for MatrixHandle {
    fn from_ref(app_state: &AppState) -> MatrixHandle {
        app_state.matrix.clone()
    }
}

impl FromRef<AppState> for LoginService {
    fn from_ref(app_state: &AppState) -> LoginService {
        app_state.login.clone()
    }
}

/// create_router
///
/// Assembles the routes, puts the gateway in front of every protected one, and
/// applies the observability layers.
///
/// Registered routes that the live matrix does not cover are logged once here; the
/// gateway denies them until a matching `endpoints` row exists.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Gateway-protected routes
    let guarded = authenticated::authenticated_routes(state.gateway.clone())
        .merge(admin::admin_routes(state.gateway.clone()));

    let gated = guarded.gated_identities();
    let matrix = state.matrix.snapshot();
    for route in matrix.uncovered(&gated) {
        tracing::warn!(route = %route, "Route has no permission matrix entry and will be denied");
    }

    // 3. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Swagger UI over the generated OpenAPI document.
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: never reach the gateway.
        .merge(public::public_routes())
        // Protected Routes: each one wrapped in the gateway middleware with its name.
        .merge(guarded.into_router())
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one span per request, carrying the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `http_request` span with method, URI and the `x-request-id` header,
/// so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
