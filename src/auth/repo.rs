use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{AuthProvider, User};

const USER_COLUMNS: &str = "id, full_name, email, phone, password_hash, avatar, \
     auth_provider, provider_id, role, address, is_active, created_at, updated_at";

impl User {
    /// Find a user by email. Callers lowercase the email first.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a local-credentials user. The unique index on email resolves
    /// duplicate-registration races; the violation surfaces as a database
    /// error the caller maps to a conflict.
    pub async fn create_local(
        db: &PgPool,
        full_name: &str,
        email: &str,
        phone: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (full_name, email, phone, password_hash, auth_provider)
             VALUES ($1, $2, $3, $4, 'local')
             RETURNING {USER_COLUMNS}"
        ))
        .bind(full_name)
        .bind(email)
        .bind(phone)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    /// Create a user provisioned from a verified social profile.
    pub async fn create_social(
        db: &PgPool,
        full_name: &str,
        email: &str,
        avatar: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (full_name, email, avatar, auth_provider, provider_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(full_name)
        .bind(email)
        .bind(avatar)
        .bind(provider)
        .bind(provider_id)
        .fetch_one(db)
        .await
    }

    /// One-way upgrade of a local account to a social provider. The avatar
    /// is backfilled only when the user has none yet; the password hash is
    /// left in place but becomes unreachable through the login path.
    pub async fn upgrade_to_social(
        db: &PgPool,
        id: Uuid,
        provider: AuthProvider,
        provider_id: &str,
        avatar: &str,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET auth_provider = $2,
                 provider_id = $3,
                 avatar = CASE WHEN avatar = '' THEN $4 ELSE avatar END,
                 updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(provider)
        .bind(provider_id)
        .bind(avatar)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Partial profile update: absent fields are left untouched.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        full_name: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET full_name = COALESCE($2, full_name),
                 phone = COALESCE($3, phone),
                 address = COALESCE($4, address),
                 updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(full_name)
        .bind(phone)
        .bind(address)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }
}
