#![allow(dead_code)]

use axum::{body::Body, response::Response};
use chrono::{DateTime, Utc};
use rolegate::{
    AppConfig, AppState,
    login::hash_password,
    matrix::{MatrixHandle, MatrixLoader, MatrixScope},
    models::{App, Endpoint, Feature, Role, SaltRecord},
    repository::{MockData, MockRepository, RepositoryState, SALT_RECORD_ID, mock_user},
    salt::{SaltRotator, SaltStore},
    token::{TokenKind, TokenSubject},
};
use std::sync::Arc;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery staple";
pub const CURRENT_SECRET: &str = "current-signing-secret-for-tests";
pub const PREVIOUS_SECRET: &str = "previous-signing-secret-for-tests";

pub const EDITOR_EMAIL: &str = "editor@mail.com";
pub const VIEWER_EMAIL: &str = "viewer@mail.com";
pub const ADMIN_EMAIL: &str = "admin@mail.com";
pub const DISABLED_EMAIL: &str = "disabled@mail.com";

pub fn app_uuid() -> Uuid {
    Uuid::from_u128(0x0a11)
}

pub fn other_app_uuid() -> Uuid {
    Uuid::from_u128(0x0b22)
}

fn app(id: i64, uuid: Uuid, name: &str) -> App {
    App {
        id,
        uuid,
        name: name.to_string(),
        description: String::new(),
        active: true,
    }
}

fn role(id: i64, name: &str, app_id: i64) -> Role {
    Role {
        id,
        name: name.to_string(),
        description: String::new(),
        active: true,
        app_id: Some(app_id),
    }
}

fn feature(id: i64, name: &str, role_id: i64) -> Feature {
    Feature {
        id,
        name: name.to_string(),
        description: String::new(),
        active: true,
        role_id: Some(role_id),
    }
}

fn endpoint(id: i64, name: &str, path: &str, method: &str, feature_id: i64) -> Endpoint {
    Endpoint {
        id,
        name: name.to_string(),
        route_path: path.to_string(),
        method: method.to_string(),
        description: String::new(),
        feature_id: Some(feature_id),
    }
}

/// fixture_data
///
/// Blog app: Editor → Posts → update_post (PATCH), Viewer → Reading → list_posts
/// (GET), Admin → Operations → the operator routes, Anonymous → Profile → get_me.
/// A second app owns a single `export_report` endpoint.
pub fn fixture_data() -> MockData {
    let hash = hash_password(PASSWORD, &AppConfig::default().password_salt);
    let mut disabled = mock_user(4, DISABLED_EMAIL, hash.clone());
    disabled.disabled = true;

    MockData {
        apps: vec![app(1, app_uuid(), "blog"), app(2, other_app_uuid(), "reports")],
        roles: vec![
            role(10, "Editor", 1),
            role(11, "Viewer", 1),
            role(12, "Admin", 1),
            role(13, "Anonymous", 1),
            role(20, "Analyst", 2),
        ],
        features: vec![
            feature(100, "Posts", 10),
            feature(101, "Reading", 11),
            feature(102, "Operations", 12),
            feature(103, "Profile", 13),
            feature(200, "Reports", 20),
        ],
        endpoints: vec![
            endpoint(1000, "update_post", "/post/{id}", "PATCH", 100),
            endpoint(1001, "list_posts", "/post", "GET", 101),
            endpoint(1002, "get_jwt_salts", "/api/v1/jwtsalt", "GET", 102),
            endpoint(1003, "reload_matrix", "/api/v1/matrix/reload", "POST", 102),
            endpoint(1004, "get_app_matrix", "/api/v1/appmatrix/{app_uuid}", "GET", 102),
            endpoint(1005, "get_me", "/api/v1/me", "GET", 103),
            endpoint(2000, "export_report", "/report/export", "GET", 200),
        ],
        users: vec![
            mock_user(1, EDITOR_EMAIL, hash.clone()),
            mock_user(2, VIEWER_EMAIL, hash.clone()),
            mock_user(3, ADMIN_EMAIL, hash),
            disabled,
        ],
        user_roles: vec![(1, 10), (2, 11), (3, 12), (4, 10)],
        salt: Some(salt_record(Utc::now())),
    }
}

pub fn salt_record(rotated_at: DateTime<Utc>) -> SaltRecord {
    SaltRecord {
        id: SALT_RECORD_ID,
        current_secret: CURRENT_SECRET.to_string(),
        previous_secret: PREVIOUS_SECRET.to_string(),
        rotated_at,
    }
}

/// Full application state over the in-memory repository, built the way `main`
/// builds it.
pub async fn test_state(repo: Arc<MockRepository>) -> AppState {
    let repo: RepositoryState = repo;
    let pair = SaltRotator::provision(&repo)
        .await
        .expect("provisioning against the mock cannot fail");
    let salts = Arc::new(SaltStore::new(pair));
    let matrix = MatrixLoader::new(repo.clone())
        .load(MatrixScope::Global)
        .await
        .expect("matrix load against the mock cannot fail");
    AppState::new(repo, AppConfig::default(), salts, MatrixHandle::new(matrix))
}

pub fn subject(roles: &[&str]) -> TokenSubject {
    TokenSubject {
        user_id: 42,
        user_uuid: Uuid::from_u128(42),
        email: "someone@mail.com".to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn token_for(state: &AppState, roles: &[&str], kind: TokenKind) -> String {
    state
        .codec
        .issue(&subject(roles), kind, Utc::now())
        .expect("signing with a valid secret")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(value.to_string())
}
