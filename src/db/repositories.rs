//! Repositories: users and sessions.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;

// ---- Users ----

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub password_expires_at: DateTime<Utc>,
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Postgres error code for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

pub async fn user_create(
    pool: &DbPool,
    login: &str,
    password_hash: &str,
    password_expires_at: DateTime<Utc>,
) -> AppResult<UserRow> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (login, password_hash, password_expires_at)
        VALUES ($1, $2, $3)
        RETURNING id, login, password_hash, password_expires_at, notification_sent, created_at
        "#,
    )
    .bind(login)
    .bind(password_hash)
    .bind(password_expires_at)
    .fetch_one(pool)
    .await;
    match row {
        Ok(row) => Ok(row),
        // Two concurrent registers can both pass the service's existence
        // check; the unique index on login is the authority.
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Err(AppError::Conflict("login already registered".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn user_find_by_login(pool: &DbPool, login: &str) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, login, password_hash, password_expires_at, notification_sent, created_at FROM users WHERE login = $1",
    )
    .bind(login)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Ids of users whose password has expired and who have not been notified yet.
/// Single unbounded query; the due set is assumed to fit in memory.
pub async fn users_expired_unnotified(pool: &DbPool) -> AppResult<Vec<Uuid>> {
    let rows = sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM users WHERE password_expires_at < NOW() AND notification_sent = false",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Flip `notification_sent` for one user. The flag only ever goes false -> true here.
pub async fn user_mark_notified(pool: &DbPool, id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE users SET notification_sent = true WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- Sessions ----

#[derive(Debug, FromRow, serde::Serialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub key: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
}

pub async fn session_insert(pool: &DbPool, key: Uuid, user_id: Uuid) -> AppResult<SessionRow> {
    let row = sqlx::query_as::<_, SessionRow>(
        r#"
        INSERT INTO sessions (key, user_id)
        VALUES ($1, $2)
        RETURNING id, key, user_id, started_at
        "#,
    )
    .bind(key)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn session_find_by_key(pool: &DbPool, key: Uuid) -> AppResult<Option<SessionRow>> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT id, key, user_id, started_at FROM sessions WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn session_delete_by_key(pool: &DbPool, key: Uuid) -> AppResult<bool> {
    let r = sqlx::query("DELETE FROM sessions WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(r.rows_affected() > 0)
}
