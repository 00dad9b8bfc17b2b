use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::model::{NewUser, Role, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailExists,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence boundary for user records. The identity flows only ever talk
/// to this trait; production wires [`PgUserStore`], tests wire
/// [`MemoryUserStore`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Insert a user. Uniqueness and the first-user-becomes-admin promotion
    /// are both decided inside this single call, not by the caller.
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    async fn set_password_hash(&self, id: Uuid, hash: &str) -> anyhow::Result<()>;
    async fn admin_exists(&self) -> anyhow::Result<bool>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, role, password_hash, created_at, updated_at";

/// Advisory-lock key serializing the is-this-the-first-user decision across
/// connections. Scoped to the insert transaction, released at commit.
const BOOTSTRAP_LOCK_KEY: i64 = 0x746f_776e_7371_0001;

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await.map_err(anyhow::Error::from)?;

        // Under READ COMMITTED two racing inserts into an empty table would
        // each see EXISTS as false and both bootstrap as admin; the advisory
        // lock serializes the promotion decision until this transaction
        // commits or rolls back.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;

        // A conflicting email comes back as no row.
        let inserted = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, first_name, last_name, role, password_hash)
            SELECT $1, $2, $3,
                   CASE WHEN EXISTS (SELECT 1 FROM users)
                        THEN $4::user_role
                        ELSE 'admin'::user_role
                   END,
                   $5
            ON CONFLICT (lower(email)) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role)
        .bind(&new.password_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        let user = inserted.ok_or(StoreError::EmailExists)?;
        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(user)
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn admin_exists(&self) -> anyhow::Result<bool> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&self.db)
                .await?;
        Ok(row.0)
    }
}

/// In-memory user store. Used by `AppState::fake()` and unit tests; mirrors
/// the Postgres store's semantics, including the bootstrap-admin promotion.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new.email) {
            return Err(StoreError::EmailExists);
        }
        let role = if users.is_empty() { Role::Admin } else { new.role };
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            role,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.password_hash = Some(hash.to_string());
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn admin_exists(&self) -> anyhow::Result<bool> {
        let users = self.users.lock().unwrap();
        Ok(users.values().any(|u| u.role == Role::Admin))
    }
}
