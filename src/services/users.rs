//! User account service: register and login.

use chrono::{Duration, Utc};
use tracing::info;

use crate::auth::PasswordService;
use crate::db::{self, DbPool, UserRow};
use crate::error::{AppError, AppResult};

/// How long a freshly set password stays valid before the expiry
/// notification worker picks the user up.
const PASSWORD_TTL_DAYS: i64 = 90;

#[derive(Clone)]
pub struct UsersService {
    db: DbPool,
}

impl UsersService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Create a new user. Fails with `Conflict` when the login is taken.
    pub async fn register(&self, login: &str, password: &str) -> AppResult<UserRow> {
        if db::user_find_by_login(&self.db, login).await?.is_some() {
            return Err(AppError::Conflict("login already registered".to_string()));
        }

        let password_hash = PasswordService::hash(password)?;
        let expires_at = Utc::now() + Duration::days(PASSWORD_TTL_DAYS);
        let user = db::user_create(&self.db, login, &password_hash, expires_at).await?;
        info!(user_id = %user.id, login = %user.login, "user registered");
        Ok(user)
    }

    /// Verify credentials. Unknown login and bad password are indistinguishable
    /// to the caller.
    pub async fn login(&self, login: &str, password: &str) -> AppResult<UserRow> {
        let user = db::user_find_by_login(&self.db, login)
            .await?
            .ok_or_else(|| AppError::Auth("invalid login or password".to_string()))?;

        if !PasswordService::verify(password, &user.password_hash)? {
            return Err(AppError::Auth("invalid login or password".to_string()));
        }

        Ok(user)
    }
}
