use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Permission Hierarchy (Mapped to Database) ---

/// App
///
/// Tenant boundary. Owns roles through `roles.app_id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct App {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// Role
///
/// Belongs to exactly one App. Its `name` is what the permission matrix stores
/// and what access tokens carry in their `roles` claim.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub app_id: Option<i64>,
}

/// Feature
///
/// A named group of endpoints granted to exactly one Role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub role_id: Option<i64>,
}

/// Endpoint
///
/// A registered route. `(name, method)` is its route identity and must match the
/// name the route was registered under in `routes`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Endpoint {
    pub id: i64,
    pub name: String,
    pub route_path: String,
    pub method: String,
    pub description: String,
    pub feature_id: Option<i64>,
}

/// User
///
/// Account record from the `users` table. Roles come from `user_roles`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub uuid: Uuid,
    pub email: String,
    // Hex SHA-512 of password || SECRET_SALT. Never leaves the server.
    #[serde(skip_serializing)]
    #[sqlx(rename = "password")]
    pub password_hash: String,
    pub date_registered: DateTime<Utc>,
    pub disabled: bool,
}

/// SaltRecord
///
/// The singleton `jwt_salts` row (id = 1). Rotation updates it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SaltRecord {
    pub id: i16,
    pub current_secret: String,
    pub previous_secret: String,
    pub rotated_at: DateTime<Utc>,
}

/// PermissionRow
///
/// One row of the flattened App→Role→Feature→Endpoint join.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PermissionRow {
    pub endpoint_name: String,
    pub method: String,
    pub role_name: String,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Body of `POST /api/v1/login`. Which fields are required depends on `grant_type`,
/// so all of them are optional at the wire level.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    /// One of `authorization_code`, `refresh_token`, `token_decode`.
    #[serde(default)]
    #[schema(example = "authorization_code")]
    pub grant_type: Option<String>,
    #[serde(default)]
    #[schema(example = "superuser@mail.com")]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

// --- Response Payloads (Output Schemas) ---

/// ApiResponse
///
/// Envelope shared by every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub details: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, details: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            details: details.into(),
        }
    }

    pub fn failure(details: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            details: details.into(),
        }
    }
}

/// TokenResponse
///
/// Tokens returned by the `authorization_code` and `refresh_token` grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// SaltResponse
///
/// Both signing secrets, for peer services that verify tokens themselves.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SaltResponse {
    pub current_secret: String,
    pub previous_secret: String,
}

/// MatrixReloadResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MatrixReloadResponse {
    /// Number of route identities in the freshly installed matrix.
    pub entries: usize,
}

/// AppMatrixResponse
///
/// Permission matrix restricted to one tenant app.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AppMatrixResponse {
    pub app_uuid: Uuid,
    /// Route identity key (`"{name}_{method}"`) to required role name.
    pub entries: HashMap<String, String>,
}

/// UserProfile
///
/// The verified identity attached to a request by the gateway (GET /api/v1/me).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub user_id: i64,
    pub uuid: Uuid,
    pub email: String,
    pub roles: Vec<String>,
}
