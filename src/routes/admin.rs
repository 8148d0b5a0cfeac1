use super::{API_PREFIX, GuardedRouter};
use crate::{AppState, auth::AuthGateway, handlers};

/// Admin Router Module
///
/// Operator and peer-service endpoints. Which role may call each one is decided
/// entirely by the permission matrix.
pub fn admin_routes(gateway: AuthGateway) -> GuardedRouter<AppState> {
    GuardedRouter::new(gateway)
        // GET /api/v1/jwtsalt
        // Both signing secrets, for peers that verify tokens locally.
        .get(
            &format!("{API_PREFIX}/jwtsalt"),
            "get_jwt_salts",
            handlers::get_jwt_salts,
        )
        // POST /api/v1/matrix/reload
        // Rebuilds the matrix from the store and swaps it in. A failed load keeps
        // the running matrix.
        .post(
            &format!("{API_PREFIX}/matrix/reload"),
            "reload_matrix",
            handlers::reload_matrix,
        )
        // GET /api/v1/appmatrix/{app_uuid}
        // The matrix restricted to one tenant app. Read-only.
        .get(
            &format!("{API_PREFIX}/appmatrix/{{app_uuid}}"),
            "get_app_matrix",
            handlers::get_app_matrix,
        )
}
