//! Integration tests for the diagnostics probe.

use std::time::Duration;

use stoma_core::probe::{ProbeOptions, ProbeOutcome, run_probe};
use stoma_db::config::DbConfig;
use stoma_db::error::ConnectionError;
use stoma_test_utils::{create_test_db, drop_test_db, server_config, unique_db_config};

fn options() -> ProbeOptions {
    ProbeOptions {
        connect_timeout: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn missing_database_is_created_then_needs_init() {
    let config = unique_db_config().await;

    let first = run_probe(&config, &options()).await;
    assert_eq!(first.outcome, ProbeOutcome::NeedsSchemaCreation, "{first}");
    assert!(first.hint().contains("stoma db-init"));

    let second = run_probe(&config, &options()).await;
    match &second.outcome {
        ProbeOutcome::NeedsInit { missing } => {
            assert_eq!(missing.len(), 3, "all required tables missing: {missing:?}");
        }
        other => panic!("expected NeedsInit, got {other:?}"),
    }

    drop_test_db(&config.database).await;
}

#[tokio::test]
async fn migrated_database_is_ready() {
    let (pool, db_name) = create_test_db().await;
    pool.close().await;

    let config = server_config().await.with_database(db_name.clone());
    let report = run_probe(&config, &options()).await;
    assert!(report.is_ready(), "{report}");
    assert_eq!(report.steps.len(), 3);
    assert!(report.steps.iter().all(|s| s.ok));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn wrong_password_is_auth_denied() {
    let config = DbConfig {
        user: "stoma_nobody".into(),
        password: "definitely-wrong".into(),
        ..unique_db_config().await
    };

    let report = run_probe(&config, &options()).await;
    assert!(
        matches!(
            report.outcome,
            ProbeOutcome::ConnectionFailed(ConnectionError::AuthDenied(_))
        ),
        "{report}"
    );
    assert!(report.hint().contains("DB_PASSWORD"));
}

#[tokio::test]
async fn closed_port_is_refused() {
    let config = DbConfig {
        host: "127.0.0.1".into(),
        port: 1,
        ..DbConfig::default()
    };

    let report = run_probe(&config, &options()).await;
    assert!(
        matches!(
            report.outcome,
            ProbeOutcome::ConnectionFailed(ConnectionError::Refused(_))
        ),
        "{report}"
    );
    assert_eq!(report.steps.len(), 1);
    assert!(!report.steps[0].ok);
}
