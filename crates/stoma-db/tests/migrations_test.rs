//! Integration tests for database migrations and bootstrap helpers.
//!
//! Each test creates a uniquely-named database on the shared MySQL server
//! and drops it on completion.

use stoma_db::pool;
use stoma_test_utils::{create_test_db, drop_test_db, unique_db_config};

/// Tables created by the embedded migrations.
const EXPECTED_TABLES: &[&str] = &[
    "care_plan_items",
    "care_plans",
    "education_articles",
    "patients",
];

fn user_tables(tables: &[String]) -> Vec<&str> {
    tables
        .iter()
        .map(String::as_str)
        .filter(|t| !t.starts_with("_sqlx"))
        .collect()
}

#[tokio::test]
async fn migrations_create_all_tables() {
    let (pool, db_name) = create_test_db().await;

    let tables = pool::list_tables(&pool, &db_name)
        .await
        .expect("should list tables");

    assert_eq!(
        user_tables(&tables),
        EXPECTED_TABLES,
        "migration should create exactly the expected tables"
    );
    for required in pool::REQUIRED_TABLES {
        assert!(tables.iter().any(|t| t == required), "{required} missing");
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    // create_test_db already ran them once.
    pool::run_migrations(&pool)
        .await
        .expect("second migration run should succeed (idempotent)");

    let counts = pool::table_counts(&pool)
        .await
        .expect("table_counts should succeed");
    let user_counts: Vec<(&str, i64)> = counts
        .iter()
        .filter(|(name, _)| !name.starts_with("_sqlx"))
        .map(|(name, count)| (name.as_str(), *count))
        .collect();

    assert_eq!(user_counts.len(), EXPECTED_TABLES.len());
    for (name, count) in &user_counts {
        assert_eq!(*count, 0, "table {name} should be empty");
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_database_exists_is_idempotent() {
    let config = unique_db_config().await;

    let created = pool::ensure_database_exists(&config)
        .await
        .expect("first ensure should succeed");
    assert!(created, "first call should create the database");

    let created_again = pool::ensure_database_exists(&config)
        .await
        .expect("second ensure should succeed (idempotent)");
    assert!(!created_again, "second call should find the database");

    let db_pool = pool::create_pool(&config)
        .await
        .expect("should connect to the new database");
    db_pool.close().await;

    drop_test_db(&config.database).await;
}

#[tokio::test]
async fn create_pool_reports_missing_database() {
    let config = unique_db_config().await;

    let err = pool::create_pool(&config)
        .await
        .expect_err("connecting to a missing database should fail");

    assert!(
        matches!(err, stoma_db::error::StoreError::SchemaMissing(_)),
        "unexpected error: {err:?}"
    );
}
