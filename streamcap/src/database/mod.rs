//! Persistence layer: SQLite via sqlx.
//!
//! Connection pool management, timestamp helpers, models, and repositories.

pub mod models;
pub mod repositories;
pub mod time;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

use crate::Result;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 5;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

async fn apply_per_connection_pragmas(
    conn: &mut sqlx::SqliteConnection,
) -> std::result::Result<(), sqlx::Error> {
    // Keep the WAL from growing without bound between checkpoints.
    sqlx::query("PRAGMA wal_autocheckpoint = 500")
        .execute(&mut *conn)
        .await?;

    sqlx::query("PRAGMA cache_size = -8000")
        .execute(&mut *conn)
        .await?;

    sqlx::query("PRAGMA mmap_size = 268435456")
        .execute(&mut *conn)
        .await?;

    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Initialize the database connection pool with WAL mode enabled.
pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| {
            Box::pin(async move { apply_per_connection_pragmas(&mut *conn).await })
        })
        .connect_with(connect_options)
        .await?;

    tracing::debug!(
        "Database pool initialized with WAL mode, {} max connections",
        DEFAULT_POOL_SIZE
    );

    Ok(pool)
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database is ready");
    Ok(())
}
