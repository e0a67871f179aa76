//! Unit tests for database initialization
//!
//! Covers:
//! - Automatic database creation with the recalls schema
//! - Reopening an existing database
//! - Unique constraint on recall_number

use recall_common::db::init::{init_database, init_database_at};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("recalls.db");

    let result = init_database_at(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("recalls.db");

    let pool1 = init_database_at(&db_path).await;
    assert!(pool1.is_ok());

    let pool2 = init_database_at(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_recalls_table_columns() {
    let pool = init_database("sqlite::memory:").await.unwrap();

    let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info('recalls')")
        .fetch_all(&pool)
        .await
        .unwrap();
    let names: Vec<&str> = columns.iter().map(|(name,)| name.as_str()).collect();

    assert_eq!(
        names,
        vec![
            "id",
            "recall_number",
            "reason_for_recall",
            "product_description",
            "recall_initiation_date"
        ]
    );
}

#[tokio::test]
async fn test_duplicate_recall_number_rejected_by_schema() {
    let pool = init_database("sqlite::memory:").await.unwrap();

    sqlx::query("INSERT INTO recalls (recall_number) VALUES ('F-1')")
        .execute(&pool)
        .await
        .unwrap();

    let second = sqlx::query("INSERT INTO recalls (recall_number) VALUES ('F-1')")
        .execute(&pool)
        .await;

    let err = second.expect_err("Second insert with same recall_number must fail");
    let is_unique = err
        .as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false);
    assert!(is_unique, "Expected unique violation, got {:?}", err);
}

#[tokio::test]
async fn test_invalid_database_url_is_config_error() {
    let err = init_database("postgres://nope").await.unwrap_err();
    assert!(err.is_config());
}
