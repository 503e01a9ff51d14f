//! Storage contract consumed by the notification worker.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::AppResult;

/// The narrow slice of persistence the worker needs. The production
/// implementation is [`PgNotifyStore`]; tests use an in-memory mock.
#[async_trait]
pub trait NotifyStore: Send + Sync {
    /// Ids of users whose password has expired without a notification.
    async fn expired_unnotified(&self) -> AppResult<Vec<Uuid>>;

    /// Record that the expiry notification for one user went out.
    async fn mark_notified(&self, id: Uuid) -> AppResult<()>;
}

/// Store backed by the PostgreSQL pool.
pub struct PgNotifyStore {
    db: DbPool,
}

impl PgNotifyStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotifyStore for PgNotifyStore {
    async fn expired_unnotified(&self) -> AppResult<Vec<Uuid>> {
        db::users_expired_unnotified(&self.db).await
    }

    async fn mark_notified(&self, id: Uuid) -> AppResult<()> {
        db::user_mark_notified(&self.db, id).await
    }
}
