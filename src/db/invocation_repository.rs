use async_trait::async_trait;
use uuid::Uuid;

use crate::models::invocation::InvocationRecord;

pub const RECENT_INVOCATIONS_LIMIT: i64 = 100;

#[async_trait]
pub trait InvocationRepository: Send + Sync {
    async fn create(&self, record: &InvocationRecord) -> Result<(), sqlx::Error>;

    /// Overwrites every mutable column of an existing record.
    async fn save(&self, record: &InvocationRecord) -> Result<(), sqlx::Error>;

    async fn find(&self, id: Uuid) -> Result<Option<InvocationRecord>, sqlx::Error>;

    /// Newest first, by `received_at`.
    async fn list_recent(&self, limit: i64) -> Result<Vec<InvocationRecord>, sqlx::Error>;
}
