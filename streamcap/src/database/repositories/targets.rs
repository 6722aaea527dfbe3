//! Target repository: the durable registry of tracked sources.

use async_trait::async_trait;
use chrono::{Days, Local};
use sqlx::SqlitePool;

use crate::database::models::{CaptureStatus, ListingRow, RoomRow, TargetRecord};
use crate::database::time::{now_string, today_string};
use crate::{Error, Result};

/// Sort key accepted by the console listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Date,
    Num,
}

impl SortKey {
    /// Column the key maps to. Kept as a closed enum so no user input ever
    /// reaches the ORDER BY clause.
    fn column(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Date => "last_broadcast",
            SortKey::Num => "recorded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(SortKey::Name),
            "date" => Some(SortKey::Date),
            "num" => Some(SortKey::Num),
            _ => None,
        }
    }
}

/// Target repository trait.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// Followed targets with no active recording, excluding blocked rows and
    /// rows unseen for longer than `staleness_days`.
    async fn followed_idle(&self, staleness_days: i64) -> Result<Vec<String>>;
    async fn get(&self, name: &str) -> Result<Option<TargetRecord>>;
    async fn capture_status(&self, name: &str) -> Result<Option<CaptureStatus>>;
    async fn pid_for(&self, name: &str) -> Result<Option<i64>>;
    /// Durable "capturing" marker. Refuses to apply when the target already
    /// has a pid, is unfollowed, or is blocked.
    async fn assign_pid(&self, name: &str, pid: i64) -> Result<()>;
    async fn clear_pid(&self, pid: i64) -> Result<()>;
    /// Upsert performed on every resolution attempt: creates the row, sets
    /// follow on unfollowed (and unblocked) rows, refreshes the edge domain.
    async fn upsert_followed(&self, name: &str, site: &str, domain: Option<&str>) -> Result<()>;
    /// Bulk upsert of listing-scan rows, keeping the running viewer maximum.
    async fn upsert_discovered(&self, rows: &[RoomRow]) -> Result<()>;
    async fn active_pids(&self) -> Result<Vec<(String, i64)>>;
    async fn recorded_counts(&self, names: &[String]) -> Result<Vec<(String, i64)>>;
    async fn offline_details(&self, names: &[String]) -> Result<Vec<ListingRow>>;
    async fn capturing_listing(&self, sort: SortKey) -> Result<Vec<ListingRow>>;
    async fn offline_listing(&self, sort: SortKey) -> Result<Vec<ListingRow>>;
    async fn unfollow(&self, name: &str) -> Result<()>;
    /// Console `stop`: clear both the follow flag and the pid.
    async fn stop_capturing(&self, name: &str) -> Result<()>;
    async fn block(&self, name: &str, reason: &str) -> Result<()>;
}

/// SQLx implementation of [`TargetRepository`].
pub struct SqlxTargetRepository {
    pool: SqlitePool,
}

impl SqlxTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for SqlxTargetRepository {
    async fn followed_idle(&self, staleness_days: i64) -> Result<Vec<String>> {
        let cutoff = Local::now()
            .checked_sub_days(Days::new(staleness_days.max(0) as u64))
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name FROM streamers
            WHERE (last_broadcast > ? OR last_broadcast IS NULL)
            AND follow IS NOT NULL AND pid IS NULL AND block_date IS NULL
            ORDER BY RANDOM()
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn get(&self, name: &str) -> Result<Option<TargetRecord>> {
        let record = sqlx::query_as::<_, TargetRecord>("SELECT * FROM streamers WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn capture_status(&self, name: &str) -> Result<Option<CaptureStatus>> {
        let status = sqlx::query_as::<_, CaptureStatus>(
            "SELECT follow, block_date, domain FROM streamers WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    async fn pid_for(&self, name: &str) -> Result<Option<i64>> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT pid FROM streamers WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(pid,)| pid))
    }

    async fn assign_pid(&self, name: &str, pid: i64) -> Result<()> {
        let now = now_string();
        let result = sqlx::query(
            r#"
            UPDATE streamers
            SET recorded = recorded + 1, pid = ?, last_capture = ?, last_broadcast = ?
            WHERE name = ? AND pid IS NULL AND follow IS NOT NULL AND block_date IS NULL
            "#,
        )
        .bind(pid)
        .bind(&now)
        .bind(&now)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::store_write(format!("assign pid for {name}")));
        }
        Ok(())
    }

    async fn clear_pid(&self, pid: i64) -> Result<()> {
        sqlx::query("UPDATE streamers SET pid = NULL WHERE pid = ?")
            .bind(pid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_followed(&self, name: &str, site: &str, domain: Option<&str>) -> Result<()> {
        let now = now_string();
        sqlx::query(
            r#"
            INSERT INTO streamers (name, site, follow, first_seen, domain)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                first_seen = IFNULL(first_seen, excluded.first_seen),
                domain = COALESCE(excluded.domain, domain),
                follow = CASE
                    WHEN block_date IS NULL THEN IFNULL(follow, excluded.follow)
                    ELSE follow
                END
            "#,
        )
        .bind(name)
        .bind(site)
        .bind(&now)
        .bind(&now)
        .bind(domain)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_discovered(&self, rows: &[RoomRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO streamers (name, followers, viewers)
                VALUES (?, ?, ?)
                ON CONFLICT (name) DO UPDATE SET
                    followers = excluded.followers,
                    viewers = excluded.viewers,
                    last_broadcast = DATETIME('now', 'localtime'),
                    most_viewers = MAX(most_viewers, excluded.viewers)
                "#,
            )
            .bind(&row.name)
            .bind(row.followers)
            .bind(row.viewers)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn active_pids(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT name, pid FROM streamers WHERE pid IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn recorded_counts(&self, names: &[String]) -> Result<Vec<(String, i64)>> {
        let mut counts = Vec::with_capacity(names.len());
        for name in names {
            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT name, recorded FROM streamers WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some(row) = row {
                counts.push(row);
            }
        }
        Ok(counts)
    }

    async fn offline_details(&self, names: &[String]) -> Result<Vec<ListingRow>> {
        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            let row: Option<ListingRow> = sqlx::query_as(
                "SELECT name, last_broadcast AS sort_value, recorded FROM streamers WHERE name = ?",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    async fn capturing_listing(&self, sort: SortKey) -> Result<Vec<ListingRow>> {
        let sql = format!(
            "SELECT name, last_capture AS sort_value, recorded FROM streamers \
             WHERE pid IS NOT NULL ORDER BY {}",
            sort.column()
        );
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn offline_listing(&self, sort: SortKey) -> Result<Vec<ListingRow>> {
        let sql = format!(
            "SELECT name, last_broadcast AS sort_value, recorded FROM streamers \
             WHERE pid IS NULL AND follow IS NOT NULL AND block_date IS NULL ORDER BY {}",
            sort.column()
        );
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn unfollow(&self, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE streamers SET follow = NULL WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::store_write(format!("unfollow {name}")));
        }
        Ok(())
    }

    async fn stop_capturing(&self, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE streamers SET follow = NULL, pid = NULL WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::store_write(format!("stop capture for {name}")));
        }
        Ok(())
    }

    async fn block(&self, name: &str, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE streamers
            SET block_date = ?, follow = NULL, notes = IFNULL(notes, '') || ?
            WHERE name = ?
            "#,
        )
        .bind(today_string())
        .bind(reason)
        .bind(name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::store_write(format!("block {name}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool, run_migrations};

    async fn repo() -> SqlxTargetRepository {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlxTargetRepository::new(pool)
    }

    #[tokio::test]
    async fn upsert_followed_sets_follow_once() {
        let repo = repo().await;
        repo.upsert_followed("alice", "Chaturbate", Some("edge1.example.net"))
            .await
            .unwrap();
        let first = repo.get("alice").await.unwrap().unwrap();
        assert!(first.is_followed());

        // A later resolution must not reset the original follow timestamp,
        // but does refresh the domain.
        repo.upsert_followed("alice", "Chaturbate", Some("edge2.example.net"))
            .await
            .unwrap();
        let second = repo.get("alice").await.unwrap().unwrap();
        assert_eq!(second.follow, first.follow);
        assert_eq!(second.domain.as_deref(), Some("edge2.example.net"));
    }

    #[tokio::test]
    async fn upsert_followed_does_not_refollow_blocked() {
        let repo = repo().await;
        repo.upsert_followed("mallory", "Chaturbate", None)
            .await
            .unwrap();
        repo.block("mallory", "spam").await.unwrap();

        repo.upsert_followed("mallory", "Chaturbate", None)
            .await
            .unwrap();
        let record = repo.get("mallory").await.unwrap().unwrap();
        assert!(record.is_blocked());
        assert!(!record.is_followed());
    }

    #[tokio::test]
    async fn assign_pid_requires_followed_and_idle() {
        let repo = repo().await;
        repo.upsert_followed("alice", "Chaturbate", None)
            .await
            .unwrap();
        repo.assign_pid("alice", 1234).await.unwrap();

        let record = repo.get("alice").await.unwrap().unwrap();
        assert_eq!(record.pid, Some(1234));
        assert_eq!(record.recorded, 1);
        assert!(record.is_followed());
        assert!(!record.is_blocked());

        // Second session for the same target is rejected while the pid holds.
        let denied = repo.assign_pid("alice", 5678).await;
        assert!(matches!(denied, Err(Error::StoreWriteFailed { .. })));
        assert_eq!(repo.pid_for("alice").await.unwrap(), Some(1234));
    }

    #[tokio::test]
    async fn assign_pid_rejects_unfollowed() {
        let repo = repo().await;
        repo.upsert_discovered(&[RoomRow {
            name: "bob".into(),
            followers: 10,
            viewers: 2,
        }])
        .await
        .unwrap();

        let denied = repo.assign_pid("bob", 42).await;
        assert!(denied.is_err());
        assert_eq!(repo.pid_for("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_pid_is_keyed_by_pid_value() {
        let repo = repo().await;
        repo.upsert_followed("alice", "Chaturbate", None)
            .await
            .unwrap();
        repo.assign_pid("alice", 1234).await.unwrap();

        repo.clear_pid(999).await.unwrap();
        assert_eq!(repo.pid_for("alice").await.unwrap(), Some(1234));

        repo.clear_pid(1234).await.unwrap();
        assert_eq!(repo.pid_for("alice").await.unwrap(), None);
        // Follow survives the clear so the next cycle can re-capture.
        assert!(repo.get("alice").await.unwrap().unwrap().is_followed());
    }

    #[tokio::test]
    async fn discovered_rows_track_running_viewer_maximum() {
        let repo = repo().await;
        repo.upsert_discovered(&[RoomRow {
            name: "carol".into(),
            followers: 50,
            viewers: 500,
        }])
        .await
        .unwrap();
        repo.upsert_discovered(&[RoomRow {
            name: "carol".into(),
            followers: 60,
            viewers: 90,
        }])
        .await
        .unwrap();

        let record = repo.get("carol").await.unwrap().unwrap();
        assert_eq!(record.viewers, Some(90));
        assert_eq!(record.most_viewers, 500);
        assert!(record.last_broadcast.is_some());
        // Discovery alone never follows a target.
        assert!(!record.is_followed());
    }

    #[tokio::test]
    async fn followed_idle_excludes_capturing_and_blocked() {
        let repo = repo().await;
        for name in ["alice", "bob", "carol"] {
            repo.upsert_followed(name, "Chaturbate", None).await.unwrap();
        }
        repo.assign_pid("alice", 100).await.unwrap();
        repo.block("carol", "gone").await.unwrap();

        let idle = repo.followed_idle(100).await.unwrap();
        assert_eq!(idle, vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn listings_partition_by_pid() {
        let repo = repo().await;
        repo.upsert_followed("alice", "Chaturbate", None)
            .await
            .unwrap();
        repo.upsert_followed("bob", "Chaturbate", None).await.unwrap();
        repo.assign_pid("alice", 77).await.unwrap();

        let capturing = repo.capturing_listing(SortKey::Name).await.unwrap();
        assert_eq!(capturing.len(), 1);
        assert_eq!(capturing[0].name, "alice");

        let offline = repo.offline_listing(SortKey::Name).await.unwrap();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].name, "bob");
    }
}
