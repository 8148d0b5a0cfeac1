use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::matrix::MatrixScope;
use crate::models::{App, Endpoint, Feature, PermissionRow, Role, SaltRecord, User};

/// Primary key of the one and only `jwt_salts` row.
pub const SALT_RECORD_ID: i16 = 1;

/// Repository Trait
///
/// Every query the authentication core needs. Database access happens only at
/// provisioning, matrix build/reload, secret rotation and login.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Signing Secrets ---
    async fn get_salt(&self) -> Result<Option<SaltRecord>, sqlx::Error>;
    /// Inserts the singleton row if it is absent, then returns whatever is stored.
    async fn provision_salt(
        &self,
        current: &str,
        previous: &str,
        now: DateTime<Utc>,
    ) -> Result<SaltRecord, sqlx::Error>;
    /// Atomically shifts `current` into `previous` and installs `next`, only when the
    /// stored current secret is still `expected_current` and the last rotation is at
    /// or before `due_before`. Returns `None` when that condition does not hold.
    async fn rotate_salt(
        &self,
        expected_current: &str,
        next: &str,
        now: DateTime<Utc>,
        due_before: DateTime<Utc>,
    ) -> Result<Option<SaltRecord>, sqlx::Error>;

    // --- Permission Matrix ---
    async fn permission_rows(&self, scope: MatrixScope) -> Result<Vec<PermissionRow>, sqlx::Error>;

    // --- Users ---
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
    /// Names of the active roles granted to the user.
    async fn user_role_names(&self, user_id: i64) -> Result<Vec<String>, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_salt(&self) -> Result<Option<SaltRecord>, sqlx::Error> {
        sqlx::query_as::<_, SaltRecord>(
            "SELECT id, current_secret, previous_secret, rotated_at FROM jwt_salts WHERE id = $1",
        )
        .bind(SALT_RECORD_ID)
        .fetch_optional(&self.pool)
        .await
    }

    /// provision_salt
    ///
    /// `ON CONFLICT DO NOTHING` keeps concurrent first starts from overwriting each
    /// other; the follow-up read returns the winner.
    async fn provision_salt(
        &self,
        current: &str,
        previous: &str,
        now: DateTime<Utc>,
    ) -> Result<SaltRecord, sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO jwt_salts (id, current_secret, previous_secret, rotated_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(SALT_RECORD_ID)
        .bind(current)
        .bind(previous)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_salt().await?.ok_or(sqlx::Error::RowNotFound)
    }

    async fn rotate_salt(
        &self,
        expected_current: &str,
        next: &str,
        now: DateTime<Utc>,
        due_before: DateTime<Utc>,
    ) -> Result<Option<SaltRecord>, sqlx::Error> {
        // Single statement: the right-hand side sees the pre-update row.
        sqlx::query_as::<_, SaltRecord>(
            r#"UPDATE jwt_salts
               SET previous_secret = current_secret,
                   current_secret = $2,
                   rotated_at = $3
               WHERE id = $1 AND current_secret = $4 AND rotated_at <= $5
               RETURNING id, current_secret, previous_secret, rotated_at"#,
        )
        .bind(SALT_RECORD_ID)
        .bind(next)
        .bind(now)
        .bind(expected_current)
        .bind(due_before)
        .fetch_optional(&self.pool)
        .await
    }

    /// permission_rows
    ///
    /// One flat join over the hierarchy. Inactive apps, roles or features drop their
    /// endpoints out of the result, which default-denies them.
    async fn permission_rows(&self, scope: MatrixScope) -> Result<Vec<PermissionRow>, sqlx::Error> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT endpoints.name AS endpoint_name, endpoints.method, roles.name AS role_name
            FROM apps
            INNER JOIN roles ON apps.id = roles.app_id
            INNER JOIN features ON features.role_id = roles.id
            INNER JOIN endpoints ON endpoints.feature_id = features.id
            WHERE apps.active = true
              AND roles.active = true
              AND features.active = true
            "#,
        );

        if let MatrixScope::App(app_uuid) = scope {
            builder.push(" AND apps.uuid = ");
            builder.push_bind(app_uuid);
        }

        builder.push(" ORDER BY apps.id, endpoints.id");

        builder
            .build_query_as::<PermissionRow>()
            .fetch_all(&self.pool)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, uuid, email, password, date_registered, disabled FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    async fn user_role_names(&self, user_id: i64) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"SELECT roles.name FROM roles
               INNER JOIN user_roles ON user_roles.role_id = roles.id
               WHERE user_roles.user_id = $1 AND roles.active = true
               ORDER BY roles.name"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}

// --- In-Memory Implementation (For Tests) ---

/// MockData
///
/// Table contents backing `MockRepository`. Rows reference each other by id,
/// exactly like the SQL schema.
#[derive(Debug, Default, Clone)]
pub struct MockData {
    pub apps: Vec<App>,
    pub roles: Vec<Role>,
    pub features: Vec<Feature>,
    pub endpoints: Vec<Endpoint>,
    pub users: Vec<User>,
    // (user_id, role_id)
    pub user_roles: Vec<(i64, i64)>,
    pub salt: Option<SaltRecord>,
}

/// WriteGate
///
/// Parks `MockRepository::rotate_salt` before it writes, until the test releases it.
#[derive(Debug, Default)]
pub struct WriteGate {
    entered: Notify,
    release: Notify,
}

impl WriteGate {
    /// Resolves once a write has reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// MockRepository
///
/// An in-memory `Repository` used by unit and integration tests, so the gateway,
/// rotator and login flows can run without Postgres.
pub struct MockRepository {
    data: Mutex<MockData>,
    /// When true, salt writes fail as if the database were unreachable.
    pub fail_salt_writes: bool,
    /// When true, matrix queries fail.
    pub fail_permission_rows: bool,
    /// When set, salt rotations wait at the gate before writing.
    pub salt_write_gate: Option<Arc<WriteGate>>,
}

impl MockRepository {
    pub fn new(data: MockData) -> Self {
        Self {
            data: Mutex::new(data),
            fail_salt_writes: false,
            fail_permission_rows: false,
            salt_write_gate: None,
        }
    }

    /// Applies `change` to the stored tables, e.g. to deactivate a role mid-test.
    pub async fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut MockData),
    {
        let mut data = self.data.lock().await;
        change(&mut data);
    }

    pub async fn snapshot(&self) -> MockData {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn get_salt(&self) -> Result<Option<SaltRecord>, sqlx::Error> {
        Ok(self.data.lock().await.salt.clone())
    }

    async fn provision_salt(
        &self,
        current: &str,
        previous: &str,
        now: DateTime<Utc>,
    ) -> Result<SaltRecord, sqlx::Error> {
        if self.fail_salt_writes {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut data = self.data.lock().await;
        let record = data.salt.get_or_insert_with(|| SaltRecord {
            id: SALT_RECORD_ID,
            current_secret: current.to_string(),
            previous_secret: previous.to_string(),
            rotated_at: now,
        });
        Ok(record.clone())
    }

    async fn rotate_salt(
        &self,
        expected_current: &str,
        next: &str,
        now: DateTime<Utc>,
        due_before: DateTime<Utc>,
    ) -> Result<Option<SaltRecord>, sqlx::Error> {
        if let Some(gate) = &self.salt_write_gate {
            gate.pass().await;
        }
        if self.fail_salt_writes {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut data = self.data.lock().await;
        match data.salt.as_mut() {
            Some(record)
                if record.current_secret == expected_current && record.rotated_at <= due_before =>
            {
                record.previous_secret = std::mem::replace(&mut record.current_secret, next.to_string());
                record.rotated_at = now;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn permission_rows(&self, scope: MatrixScope) -> Result<Vec<PermissionRow>, sqlx::Error> {
        if self.fail_permission_rows {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let data = self.data.lock().await;

        let mut apps: Vec<&App> = data
            .apps
            .iter()
            .filter(|app| app.active)
            .filter(|app| match scope {
                MatrixScope::Global => true,
                MatrixScope::App(uuid) => app.uuid == uuid,
            })
            .collect();
        apps.sort_by_key(|app| app.id);

        let mut rows = Vec::new();
        for app in apps {
            let mut found: Vec<(i64, PermissionRow)> = Vec::new();
            for role in data.roles.iter().filter(|r| r.active && r.app_id == Some(app.id)) {
                for feature in data
                    .features
                    .iter()
                    .filter(|f| f.active && f.role_id == Some(role.id))
                {
                    for endpoint in data
                        .endpoints
                        .iter()
                        .filter(|e| e.feature_id == Some(feature.id))
                    {
                        found.push((
                            endpoint.id,
                            PermissionRow {
                                endpoint_name: endpoint.name.clone(),
                                method: endpoint.method.clone(),
                                role_name: role.name.clone(),
                            },
                        ));
                    }
                }
            }
            found.sort_by_key(|(id, _)| *id);
            rows.extend(found.into_iter().map(|(_, row)| row));
        }
        Ok(rows)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let data = self.data.lock().await;
        Ok(data.users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_role_names(&self, user_id: i64) -> Result<Vec<String>, sqlx::Error> {
        let data = self.data.lock().await;
        let mut names: Vec<String> = data
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, role_id)| data.roles.iter().find(|r| r.id == *role_id && r.active))
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Builds a `MockData` user row. The password must already be hashed.
pub fn mock_user(id: i64, email: &str, password_hash: String) -> User {
    User {
        id,
        uuid: Uuid::new_v4(),
        email: email.to_string(),
        password_hash,
        date_registered: Utc::now(),
        disabled: false,
    }
}
