//! SQLite recall backend
//!
//! Lookup is an indexed equality query on `recall_number`. Inserts rely on
//! the column's UNIQUE constraint, so a second writer racing on the same key
//! gets a unique violation instead of a duplicate row.

use super::{RecallBackend, StoreError};
use async_trait::async_trait;
use recall_common::db::init_database;
use recall_common::{Recall, RecordId, StoredRecall};
use sqlx::SqlitePool;

#[derive(Debug, sqlx::FromRow)]
struct RecallRow {
    id: i64,
    recall_number: String,
    reason_for_recall: Option<String>,
    product_description: Option<String>,
    recall_initiation_date: Option<String>,
}

impl From<RecallRow> for StoredRecall {
    fn from(row: RecallRow) -> Self {
        StoredRecall {
            id: RecordId::Row(row.id),
            recall: Recall {
                recall_number: row.recall_number,
                reason_for_recall: row.reason_for_recall,
                product_description: row.product_description,
                recall_initiation_date: row.recall_initiation_date,
            },
        }
    }
}

pub struct RelationalBackend {
    pool: SqlitePool,
}

impl RelationalBackend {
    /// Open the database and apply the schema
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = init_database(database_url).await?;
        Ok(Self { pool })
    }

    /// Wrap an already initialized pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecallBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn lookup(&self, recall_number: &str) -> Result<Option<StoredRecall>, StoreError> {
        let row: Option<RecallRow> = sqlx::query_as(
            r#"
            SELECT id, recall_number, reason_for_recall, product_description, recall_initiation_date
            FROM recalls
            WHERE recall_number = ?
            "#,
        )
        .bind(recall_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredRecall::from))
    }

    async fn insert(&self, recall: &Recall) -> Result<StoredRecall, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO recalls
                (recall_number, reason_for_recall, product_description, recall_initiation_date)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&recall.recall_number)
        .bind(&recall.reason_for_recall)
        .bind(&recall.product_description)
        .bind(&recall.recall_initiation_date)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(StoredRecall {
                id: RecordId::Row(done.last_insert_rowid()),
                recall: recall.clone(),
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateKey(recall.recall_number.clone()))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn recall_numbers(&self) -> Result<Vec<String>, StoreError> {
        let numbers: Vec<String> =
            sqlx::query_scalar("SELECT recall_number FROM recalls ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(numbers)
    }
}
