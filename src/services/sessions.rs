//! Session service: opaque session keys stored in PostgreSQL.

use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::db::{self, DbPool, SessionRow};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct SessionsService {
    db: DbPool,
    ttl: Duration,
}

impl SessionsService {
    pub fn new(db: DbPool, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    pub async fn create(&self, user_id: Uuid) -> AppResult<SessionRow> {
        let session = db::session_insert(&self.db, Uuid::new_v4(), user_id).await?;
        debug!(user_id = %user_id, session = %session.key, "session created");
        Ok(session)
    }

    /// Look up a session and enforce the server-side TTL. Expired sessions
    /// are deleted on sight.
    pub async fn validate(&self, key: Uuid) -> AppResult<SessionRow> {
        let session = db::session_find_by_key(&self.db, key)
            .await?
            .ok_or_else(|| AppError::Auth("invalid session".to_string()))?;

        let age = Utc::now()
            .signed_duration_since(session.started_at)
            .to_std()
            .unwrap_or_default();
        if age > self.ttl {
            db::session_delete_by_key(&self.db, key).await?;
            return Err(AppError::Auth("session expired".to_string()));
        }

        Ok(session)
    }

    pub async fn delete(&self, key: Uuid) -> AppResult<()> {
        let deleted = db::session_delete_by_key(&self.db, key).await?;
        if !deleted {
            debug!(session = %key, "delete of unknown session ignored");
        }
        Ok(())
    }
}
