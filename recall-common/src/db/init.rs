//! Database initialization
//!
//! Creates the SQLite file on first run and applies the `recalls` schema.
//! Every statement is idempotent, so opening an existing database is safe.

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Single writer, so a small pool is enough
const MAX_CONNECTIONS: u32 = 5;

/// Open (creating if needed) the database at `database_url` and apply the schema
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    if !database_url.starts_with("sqlite:") {
        return Err(Error::Config(format!(
            "DATABASE_URL must be a sqlite: URL, got '{}'",
            database_url
        )));
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| Error::Config(format!("Invalid DATABASE_URL '{}': {}", database_url, e)))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_millis(5000));

    let filename = options.get_filename().to_path_buf();
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    // An in-memory database lives only as long as its connection, so the
    // pool holds exactly one and never recycles it
    let (options, max_connections) = if in_memory {
        (options, 1)
    } else {
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        (options.journal_mode(SqliteJournalMode::Wal), MAX_CONNECTIONS)
    };

    let newly_created = !in_memory && !filename.exists();

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    if in_memory {
        info!("Opened in-memory database");
    } else if newly_created {
        info!("Initialized new database: {}", filename.display());
    } else {
        info!("Opened existing database: {}", filename.display());
    }

    create_recalls_table(&pool).await?;

    Ok(pool)
}

/// Open the database file at `db_path`
pub async fn init_database_at(db_path: &Path) -> Result<SqlitePool> {
    init_database(&format!("sqlite://{}?mode=rwc", db_path.display())).await
}

async fn create_recalls_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recalls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recall_number TEXT NOT NULL UNIQUE,
            reason_for_recall TEXT,
            product_description TEXT,
            recall_initiation_date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Covers tables created before the UNIQUE column constraint existed.
    // Fails if such a table already holds duplicate recall numbers.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_recalls_recall_number ON recalls(recall_number)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
