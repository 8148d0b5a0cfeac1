/// Router Module Index
///
/// Every protected route is registered through [`GuardedRouter`], which pairs the
/// (path, method) with a stable route name and wraps the handler in the gateway
/// middleware carrying that name. The name plus the method is the key the
/// permission matrix is looked up with, so a route registered here with no matching
/// `endpoints` row is always denied.

/// Routes outside the gateway (liveness).
pub mod public;

/// Login flows and the caller's own identity.
pub mod authenticated;

/// Operator routes: signing secret exposure and matrix administration.
pub mod admin;

use axum::{
    Router,
    handler::Handler,
    http::Method,
    middleware,
    routing::{self, MethodRouter},
};

use crate::{
    auth::{AuthGateway, RouteGuard, authorize},
    matrix::{RouteIdentity, is_allow_listed},
};

/// Prefix shared by every API route.
pub const API_PREFIX: &str = "/api/v1";

/// RegisteredRoute
///
/// One (path, identity) pair recorded at registration, used for the startup
/// coverage report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRoute {
    pub path: String,
    pub identity: RouteIdentity,
}

/// GuardedRouter
///
/// Builder over an axum [`Router`] that puts the gateway in front of every route.
pub struct GuardedRouter<S> {
    router: Router<S>,
    gateway: AuthGateway,
    registered: Vec<RegisteredRoute>,
}

impl<S> GuardedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(gateway: AuthGateway) -> Self {
        Self {
            router: Router::new(),
            gateway,
            registered: Vec::new(),
        }
    }

    /// route
    ///
    /// Registers `handler` at `path` under `name`. `method` must be the method the
    /// handler is bound to; it forms the second half of the matrix key. Several
    /// methods on one path are merged by axum.
    pub fn route(
        mut self,
        path: &str,
        method: Method,
        name: &'static str,
        handler: MethodRouter<S>,
    ) -> Self {
        let guard = RouteGuard::new(self.gateway.clone(), name);
        let guarded = handler.route_layer(middleware::from_fn_with_state(guard, authorize));
        self.router = self.router.route(path, guarded);
        self.registered.push(RegisteredRoute {
            path: path.to_string(),
            identity: RouteIdentity::from_method(name, &method),
        });
        self
    }

    pub fn get<H, T>(self, path: &str, name: &'static str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::GET, name, routing::get(handler))
    }

    pub fn post<H, T>(self, path: &str, name: &'static str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::POST, name, routing::post(handler))
    }

    pub fn put<H, T>(self, path: &str, name: &'static str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::PUT, name, routing::put(handler))
    }

    pub fn patch<H, T>(self, path: &str, name: &'static str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::PATCH, name, routing::patch(handler))
    }

    pub fn delete<H, T>(self, path: &str, name: &'static str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::DELETE, name, routing::delete(handler))
    }

    pub fn merge(mut self, other: GuardedRouter<S>) -> Self {
        self.router = self.router.merge(other.router);
        self.registered.extend(other.registered);
        self
    }

    pub fn registered(&self) -> &[RegisteredRoute] {
        &self.registered
    }

    /// Identities of the registered routes the gateway actually consults (the
    /// allow-listed ones are bypassed before the matrix lookup).
    pub fn gated_identities(&self) -> Vec<RouteIdentity> {
        self.registered
            .iter()
            .filter(|route| !is_allow_listed(&route.path))
            .map(|route| route.identity.clone())
            .collect()
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }
}
