//! SQLite OutboxStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::Row;
use uuid::Uuid;

use super::SqliteCommandStore;
use crate::domain::now_epoch;
use crate::storage::schema::Outbox;
use crate::storage::{OutboxRecord, OutboxStore, Result};

#[async_trait]
impl OutboxStore for SqliteCommandStore {
    async fn pending(
        &self,
        limit: u32,
        max_retries: u32,
        min_age_secs: u64,
    ) -> Result<Vec<OutboxRecord>> {
        let cutoff = now_epoch() - min_age_secs as i64;

        let query = Query::select()
            .columns([
                Outbox::EventId,
                Outbox::Payload,
                Outbox::RetryCount,
                Outbox::CreatedAt,
            ])
            .from(Outbox::Table)
            .and_where(Expr::col(Outbox::CreatedAt).lte(cutoff))
            .and_where(Expr::col(Outbox::RetryCount).lt(max_retries as i64))
            .order_by(Outbox::CreatedAt, Order::Asc)
            .limit(limit as u64)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let event_id: String = row.try_get("event_id")?;
                let retry_count: i64 = row.try_get("retry_count")?;
                Ok(OutboxRecord {
                    event_id: Uuid::parse_str(&event_id)?,
                    payload: row.try_get("payload")?,
                    retry_count: retry_count.max(0) as u32,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn mark_delivered(&self, event_id: Uuid) -> Result<()> {
        self.discard(event_id).await
    }

    async fn mark_failed(&self, event_id: Uuid) -> Result<()> {
        let query = Query::update()
            .table(Outbox::Table)
            .value(Outbox::RetryCount, Expr::col(Outbox::RetryCount).add(1))
            .and_where(Expr::col(Outbox::EventId).eq(event_id.to_string()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn discard(&self, event_id: Uuid) -> Result<()> {
        let query = Query::delete()
            .from_table(Outbox::Table)
            .and_where(Expr::col(Outbox::EventId).eq(event_id.to_string()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Outbox::EventId).count())
            .from(Outbox::Table)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }
}
