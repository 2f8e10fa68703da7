//! User repository for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use crm::models::UserMetadata;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, User};

const USER_COLUMNS: &str =
    "id, email, password_hash, metadata, email_confirmed_at, created_at, updated_at";

fn user_from_row(row: &PgRow) -> Result<User> {
    let Json(metadata): Json<UserMetadata> = row.try_get("metadata")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        metadata,
        email_confirmed_at: row.try_get("email_confirmed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    ///
    /// Returns `None` when the email address is already registered.
    pub async fn create(&self, new_user: &NewUser) -> Result<Option<User>> {
        info!("Creating new user: {}", new_user.email);

        let password_hash = hash_password(&new_user.password)?;
        let sql = format!(
            "INSERT INTO users (email, password_hash, metadata, email_confirmed_at) \
             VALUES ($1, $2, $3, CASE WHEN $4 THEN NOW() END) \
             ON CONFLICT (email) DO NOTHING \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&new_user.email)
            .bind(&password_hash)
            .bind(Json(&new_user.metadata))
            .bind(new_user.email_confirmed)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        info!("Finding user by email: {}", email);

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        info!("Finding user by ID: {}", id);

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Mark the email address of a user as confirmed
    pub async fn confirm_email(&self, email: &str) -> Result<Option<User>> {
        info!("Confirming email: {}", email);

        let sql = format!(
            "UPDATE users SET email_confirmed_at = COALESCE(email_confirmed_at, NOW()), \
             updated_at = NOW() WHERE email = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Verify a user's password
    pub fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        verify_password(&user.password_hash, password)
    }
}

/// Check `password` against a PHC-formatted Argon2 hash
pub fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    let argon2 = Argon2::default();
    Ok(argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
