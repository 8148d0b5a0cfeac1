//! Route-level permission matrix.
//!
//! The matrix maps a route identity (`"{name}_{method}"`) to the name of the role
//! required to call it. It is folded from one flat App→Role→Feature→Endpoint query
//! when the process starts and is not updated when those rows change; picking up
//! permission changes takes a restart or an explicit [`MatrixHandle::replace`]
//! (exposed as the `reload_matrix` route).

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    sync::Arc,
};

use arc_swap::ArcSwap;
use axum::http::Method;
use uuid::Uuid;

use crate::{error::MatrixLoadError, models::PermissionRow, repository::RepositoryState};

/// Role name that opens a route to any holder of a valid access token.
pub const ANONYMOUS_ROLE: &str = "Anonymous";

/// Paths that bypass the gateway entirely.
pub const ALLOW_LIST: &[PathPattern] = &[
    PathPattern::Exact("/"),
    PathPattern::Exact("/api/v1/login"),
    PathPattern::Exact("/api/v1/checklogin"),
    PathPattern::Exact("/health"),
    PathPattern::Prefix("/metrics"),
    PathPattern::Prefix("/docs"),
    PathPattern::Prefix("/api-docs"),
    PathPattern::Prefix("/static"),
];

/// A path pattern in the anonymous allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPattern {
    Exact(&'static str),
    /// Matches the path itself and anything below it, on segment boundaries.
    Prefix(&'static str),
}

impl PathPattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == *p,
            PathPattern::Prefix(p) => match path.strip_prefix(p) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

pub fn is_allow_listed(path: &str) -> bool {
    ALLOW_LIST.iter().any(|pattern| pattern.matches(path))
}

/// RouteIdentity
///
/// The stable (name, method) pair a route was registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteIdentity {
    pub name: String,
    pub method: String,
}

impl RouteIdentity {
    pub fn new(name: impl Into<String>, method: &str) -> Self {
        Self {
            name: name.into(),
            method: method.to_lowercase(),
        }
    }

    pub fn from_method(name: impl Into<String>, method: &Method) -> Self {
        Self::new(name, method.as_str())
    }

    /// Matrix key: route name and lower-cased method joined by `_`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.name, self.method)
    }
}

impl fmt::Display for RouteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.method)
    }
}

/// Which part of the hierarchy a matrix is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixScope {
    /// Every active app. This is what the gateway enforces.
    Global,
    /// A single tenant app, by uuid. Read-only views only.
    App(Uuid),
}

/// PermissionMatrix
///
/// Read-only map from route identity key to required role name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMatrix {
    entries: HashMap<String, String>,
}

impl PermissionMatrix {
    /// from_rows
    ///
    /// Folds query rows into the map. A key claimed by two roles violates the
    /// one-role-per-endpoint invariant; the first row wins and the clash is logged.
    pub fn from_rows(rows: impl IntoIterator<Item = PermissionRow>) -> Self {
        let mut entries: HashMap<String, String> = HashMap::new();
        for row in rows {
            let key = RouteIdentity::new(row.endpoint_name, &row.method).key();
            match entries.entry(key) {
                Entry::Occupied(existing) => {
                    if *existing.get() != row.role_name {
                        tracing::warn!(
                            route = %existing.key(),
                            kept = %existing.get(),
                            ignored = %row.role_name,
                            "Endpoint is linked to more than one role"
                        );
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(row.role_name);
                }
            }
        }
        Self { entries }
    }

    pub fn required_role(&self, route: &RouteIdentity) -> Option<&str> {
        self.entries.get(&route.key()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &HashMap<String, String> {
        &self.entries
    }

    /// Registered routes that have no entry, and will therefore always be denied.
    pub fn uncovered<'a>(&self, registered: &'a [RouteIdentity]) -> Vec<&'a RouteIdentity> {
        registered
            .iter()
            .filter(|route| self.required_role(route).is_none())
            .collect()
    }
}

/// MatrixLoader
///
/// Builds a [`PermissionMatrix`] from the store.
#[derive(Clone)]
pub struct MatrixLoader {
    repo: RepositoryState,
}

impl MatrixLoader {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn load(&self, scope: MatrixScope) -> Result<PermissionMatrix, MatrixLoadError> {
        let rows = self.repo.permission_rows(scope).await?;
        let matrix = PermissionMatrix::from_rows(rows);
        tracing::info!(?scope, entries = matrix.len(), "Permission matrix loaded");
        Ok(matrix)
    }
}

/// MatrixHandle
///
/// Shared cell holding the live matrix. Readers take a snapshot per request; a reload
/// swaps the whole matrix at once.
#[derive(Clone)]
pub struct MatrixHandle {
    inner: Arc<ArcSwap<PermissionMatrix>>,
}

impl MatrixHandle {
    pub fn new(matrix: PermissionMatrix) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(matrix)),
        }
    }

    pub fn snapshot(&self) -> Arc<PermissionMatrix> {
        self.inner.load_full()
    }

    pub fn replace(&self, matrix: PermissionMatrix) {
        self.inner.store(Arc::new(matrix));
    }
}
