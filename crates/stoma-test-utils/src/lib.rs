//! Shared test utilities for stoma integration tests.
//!
//! Provides a MySQL server shared across tests. Each test gets its own
//! database within the server.
//!
//! Two modes:
//! - **`STOMA_TEST_DB_HOST`** set: use that server directly (port from
//!   `STOMA_TEST_DB_PORT`, credentials from `STOMA_TEST_DB_USER` /
//!   `STOMA_TEST_DB_PASSWORD`, defaulting to `root` with no password).
//! - **No env var**: spin up a container via testcontainers, shared per
//!   binary through a `OnceCell`.

use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::{Executor, MySqlPool};
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mysql::Mysql;
use tokio::sync::OnceCell;
use uuid::Uuid;

use stoma_db::config::DbConfig;
use stoma_db::pool;

/// Shared server state: connection settings and optional container handle.
struct SharedMysql {
    config: DbConfig,
    /// Held to keep the container alive. `None` when using an external server.
    _container: Option<ContainerAsync<Mysql>>,
}

/// Lazily-initialized shared MySQL server.
static SHARED_MYSQL: OnceCell<SharedMysql> = OnceCell::const_new();

async fn init_shared_mysql() -> SharedMysql {
    if let Ok(host) = std::env::var("STOMA_TEST_DB_HOST") {
        let port = std::env::var("STOMA_TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DbConfig::DEFAULT_PORT);
        let config = DbConfig {
            host,
            port,
            user: std::env::var("STOMA_TEST_DB_USER").unwrap_or_else(|_| "root".to_owned()),
            password: std::env::var("STOMA_TEST_DB_PASSWORD").unwrap_or_default(),
            database: "mysql".to_owned(),
            ..DbConfig::default()
        };
        return SharedMysql {
            config,
            _container: None,
        };
    }

    let container = Mysql::default()
        .start()
        .await
        .expect("failed to start MySQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(3306)
        .await
        .expect("failed to get mapped port");

    let config = DbConfig {
        host: host.to_string(),
        port,
        user: "root".to_owned(),
        password: String::new(),
        database: "mysql".to_owned(),
        ..DbConfig::default()
    };

    SharedMysql {
        config,
        _container: Some(container),
    }
}

/// Connection settings for the shared server.
///
/// Lazily starts a container on first call (unless `STOMA_TEST_DB_HOST` is
/// set). The returned config points at the built-in `mysql` database; use
/// [`DbConfig::with_database`] to target another one.
pub async fn server_config() -> DbConfig {
    let shared = SHARED_MYSQL.get_or_init(init_shared_mysql).await;
    shared.config.clone()
}

/// A config pointing at a uniquely-named database that does not exist yet.
pub async fn unique_db_config() -> DbConfig {
    server_config()
        .await
        .with_database(format!("stoma_test_{}", Uuid::new_v4().simple()))
}

async fn maintenance_pool() -> MySqlPool {
    let config = server_config().await;
    MySqlPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(config.server_options())
        .await
        .expect("failed to connect to MySQL server")
}

/// Create a temporary database with migrations applied.
///
/// Returns `(pool, db_name)`. Call [`drop_test_db`] with the returned
/// `db_name` when the test is done.
pub async fn create_test_db() -> (MySqlPool, String) {
    let config = unique_db_config().await;
    let db_name = config.database.clone();

    let maint_pool = maintenance_pool().await;
    let stmt = format!("CREATE DATABASE `{db_name}` CHARACTER SET utf8mb4");
    maint_pool
        .execute(stmt.as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let temp_pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(config.connect_options())
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Drop a temporary database. Safe to call if it was never created.
pub async fn drop_test_db(db_name: &str) {
    let maint_pool = maintenance_pool().await;
    let stmt = format!("DROP DATABASE IF EXISTS `{db_name}`");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}
