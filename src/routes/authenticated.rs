use super::{API_PREFIX, GuardedRouter};
use crate::{AppState, auth::AuthGateway, handlers};

/// Authenticated Router Module
///
/// The login flows and the caller's identity. `login` and `checklogin` are on the
/// allow-list, so the gateway lets them through without a token; they still carry a
/// route name so the registry stays complete.
pub fn authenticated_routes(gateway: AuthGateway) -> GuardedRouter<AppState> {
    GuardedRouter::new(gateway)
        // POST /api/v1/login
        // Dispatches on grant_type: authorization_code, refresh_token, token_decode.
        .post(&format!("{API_PREFIX}/login"), "login_route", handlers::login)
        // GET /api/v1/checklogin
        // 202 when X-APP-TOKEN holds a valid access token, 403 otherwise.
        .get(
            &format!("{API_PREFIX}/checklogin"),
            "check_login",
            handlers::check_login,
        )
        // GET /api/v1/me
        // Echoes the identity the gateway attached to the request.
        .get(&format!("{API_PREFIX}/me"), "get_me", handlers::get_me)
}
