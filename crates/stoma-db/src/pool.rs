use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::mysql::{MySqlConnection, MySqlPoolOptions};
use sqlx::{Connection, Executor, MySql, MySqlPool};
use tracing::info;

use crate::config::DbConfig;
use crate::error::StoreError;

/// Migrations embedded at compile time from `crates/stoma-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables the service needs before it can start.
pub const REQUIRED_TABLES: &[&str] = &["care_plan_items", "care_plans", "patients"];

/// Create a connection pool with sensible defaults.
pub async fn create_pool(config: &DbConfig) -> Result<MySqlPool, StoreError> {
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(config.connect_options())
        .await?;

    info!(url = %config.display_url(), "connected to database");
    Ok(pool)
}

/// Run all pending embedded migrations against the pool.
pub async fn run_migrations(pool: &MySqlPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    info!("migrations applied successfully");
    Ok(())
}

/// Whether a database (schema) with the given name exists on the server.
pub async fn database_exists<'e, E>(executor: E, name: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?")
            .bind(name)
            .fetch_one(executor)
            .await?;
    Ok(count > 0)
}

/// Issue `CREATE DATABASE IF NOT EXISTS` for `name` with a utf8mb4 charset.
pub async fn create_database<'e, E>(executor: E, name: &str) -> Result<(), StoreError>
where
    E: Executor<'e, Database = MySql>,
{
    // Database names cannot be bound as parameters, so restrict them to a
    // safe identifier alphabet before formatting.
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::validation(format!(
            "database name {name:?} contains invalid characters"
        )));
    }
    let stmt = format!(
        "CREATE DATABASE IF NOT EXISTS `{name}` \
         CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci"
    );
    executor.execute(stmt.as_str()).await?;
    Ok(())
}

/// Names of the tables in `database`, sorted.
pub async fn list_tables<'e, E>(executor: E, database: &str) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    sqlx::query_scalar(
        "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = ? \
         ORDER BY TABLE_NAME",
    )
    .bind(database)
    .fetch_all(executor)
    .await
}

/// Ensure the target database exists, creating it if necessary.
///
/// Connects to the server without selecting a database. Returns `true` when
/// the database had to be created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let mut conn = MySqlConnection::connect_with(&config.server_options())
        .await
        .map_err(StoreError::from)
        .with_context(|| {
            format!(
                "failed to connect to database server at {}:{}",
                config.host, config.port
            )
        })?;

    let exists = database_exists(&mut conn, &config.database)
        .await
        .context("failed to query information_schema")?;

    let created = if exists {
        info!(db = %config.database, "database already exists");
        false
    } else {
        create_database(&mut conn, &config.database)
            .await
            .with_context(|| format!("failed to create database {}", config.database))?;
        info!(db = %config.database, "database created");
        true
    };

    conn.close().await.context("failed to close connection")?;
    Ok(created)
}

/// Return the row count for every table in the pool's current database.
///
/// Useful for the `stoma db-init` success message.
pub async fn table_counts(pool: &MySqlPool) -> Result<Vec<(String, i64)>> {
    let database: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
        .fetch_one(pool)
        .await
        .context("failed to resolve current database")?;
    let Some(database) = database else {
        bail!("connection has no database selected");
    };

    let tables = list_tables(pool, &database)
        .await
        .context("failed to list tables")?;

    let mut counts = Vec::with_capacity(tables.len());
    for table_name in &tables {
        // Table names come from information_schema so they are safe identifiers.
        let query = format!("SELECT COUNT(*) FROM `{table_name}`");
        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table_name}"))?;
        counts.push((table_name.clone(), count));
    }
    Ok(counts)
}
