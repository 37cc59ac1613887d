use crate::db::invocation_repository::InvocationRepository;
use crate::models::invocation::{InvocationRecord, InvocationRow};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, provider, event, triggered_at, received_at, completed_at, duration_ms,
    status, http_status, error_class, error_message, metadata, payload,
    application_id, hr_employee_id, recruiting_comment_id,
    request_id, remote_ip, user_agent
"#;

pub struct PostgresInvocationRepository {
    pub pool: PgPool,
}

fn decode(row: InvocationRow) -> Result<InvocationRecord, sqlx::Error> {
    InvocationRecord::try_from(row).map_err(|err| sqlx::Error::Decode(err.into()))
}

#[async_trait]
impl InvocationRepository for PostgresInvocationRepository {
    async fn create(&self, record: &InvocationRecord) -> Result<(), sqlx::Error> {
        sqlx::query::<Postgres>(
            r#"
            INSERT INTO invocations (
                id, provider, event, triggered_at, received_at, completed_at, duration_ms,
                status, http_status, error_class, error_message, metadata, payload,
                application_id, hr_employee_id, recruiting_comment_id,
                request_id, remote_ip, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(record.id)
        .bind(&record.provider)
        .bind(&record.event)
        .bind(record.triggered_at)
        .bind(record.received_at)
        .bind(record.completed_at)
        .bind(record.duration_ms)
        .bind(record.status.as_str())
        .bind(record.http_status)
        .bind(&record.error_class)
        .bind(&record.error_message)
        .bind(&record.metadata)
        .bind(&record.payload)
        .bind(&record.application_id)
        .bind(&record.hr_employee_id)
        .bind(&record.recruiting_comment_id)
        .bind(&record.request_id)
        .bind(&record.remote_ip)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, record: &InvocationRecord) -> Result<(), sqlx::Error> {
        sqlx::query::<Postgres>(
            r#"
            UPDATE invocations
            SET event = $2,
                triggered_at = $3,
                completed_at = $4,
                duration_ms = $5,
                status = $6,
                http_status = $7,
                error_class = $8,
                error_message = $9,
                metadata = $10,
                payload = $11,
                application_id = $12,
                hr_employee_id = $13,
                recruiting_comment_id = $14
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.event)
        .bind(record.triggered_at)
        .bind(record.completed_at)
        .bind(record.duration_ms)
        .bind(record.status.as_str())
        .bind(record.http_status)
        .bind(&record.error_class)
        .bind(&record.error_message)
        .bind(&record.metadata)
        .bind(&record.payload)
        .bind(&record.application_id)
        .bind(&record.hr_employee_id)
        .bind(&record.recruiting_comment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<InvocationRecord>, sqlx::Error> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM invocations WHERE id = $1");
        let row = sqlx::query_as::<Postgres, InvocationRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(decode).transpose()
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<InvocationRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM invocations ORDER BY received_at DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<Postgres, InvocationRow>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(decode).collect()
    }
}
