//! Aggregate statistics repository.
//!
//! Append-only metric rows written by the room-list poller. The newest row's
//! timestamp is what the rate gate compares against.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::time::parse_timestamp;

/// Metric kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    /// De-duplicated room count for one scan batch.
    Batch,
    /// Total online count reported by the listing endpoint.
    Total,
}

impl StatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatKind::Batch => "batch",
            StatKind::Total => "total",
        }
    }
}

/// Stat repository trait.
#[async_trait]
pub trait StatRepository: Send + Sync {
    async fn record(&self, kind: StatKind, value: i64) -> Result<()>;
    /// Timestamp of the most recent recorded stat, if any.
    async fn last_call(&self) -> Result<Option<NaiveDateTime>>;
}

/// SQLx implementation of [`StatRepository`].
pub struct SqlxStatRepository {
    pool: SqlitePool,
}

impl SqlxStatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatRepository for SqlxStatRepository {
    async fn record(&self, kind: StatKind, value: i64) -> Result<()> {
        sqlx::query("INSERT INTO stats (kind, value) VALUES (?, ?)")
            .bind(kind.as_str())
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn last_call(&self) -> Result<Option<NaiveDateTime>> {
        let row: (Option<String>,) = sqlx::query_as("SELECT MAX(recorded_at) FROM stats")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.as_deref().and_then(parse_timestamp))
    }
}
