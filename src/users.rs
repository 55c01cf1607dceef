use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use time::OffsetDateTime;

/// Represents a user record retrieved from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("email address is already registered")]
    DuplicateEmail,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Insert a new user and return its identifier.
///
/// Uniqueness of the email is left to the `idx_users_email` index; a
/// violation comes back as [`UserError::DuplicateEmail`].
pub async fn insert_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    hashed_password: &str,
) -> Result<i64, UserError> {
    let created_at = OffsetDateTime::now_utc().unix_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, hashed_password, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(hashed_password)
    .bind(created_at)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(err) if is_unique_violation(&err) => Err(UserError::DuplicateEmail),
        Err(err) => Err(UserError::Database(err)),
    }
}

pub async fn find_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<UserRecord>, sqlx::Error> {
    sqlx::query_as::<_, UserRecord>(
        r#"
        SELECT id, name, email, hashed_password, created_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn update_password_hash(
    pool: &SqlitePool,
    user_id: i64,
    new_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET hashed_password = ? WHERE id = ?")
        .bind(new_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
