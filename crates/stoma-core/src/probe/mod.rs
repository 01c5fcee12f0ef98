//! One-shot connectivity and schema diagnostics.
//!
//! The probe walks a fixed sequence (connect, database, tables) and stops
//! at the first step that needs operator action. It never fails: every
//! error is folded into the returned [`ProbeReport`].

use std::fmt;
use std::time::Duration;

use sqlx::mysql::MySqlConnection;
use sqlx::Connection;
use tracing::{debug, warn};

use stoma_db::config::DbConfig;
use stoma_db::error::{ConnectionError, StoreError};
use stoma_db::pool::{self, REQUIRED_TABLES};

/// Tunables for a probe run.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Upper bound on establishing the server connection.
    pub connect_timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Terminal state of a probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Database and all required tables exist.
    Ready,
    /// Database exists but lacks the listed tables.
    NeedsInit { missing: Vec<String> },
    /// Database was missing and has just been created.
    NeedsSchemaCreation,
    ConnectionFailed(ConnectionError),
}

impl ProbeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NeedsInit { .. } => "needs initialization",
            Self::NeedsSchemaCreation => "database created, needs initialization",
            Self::ConnectionFailed(_) => "connection failed",
        }
    }
}

/// One line of the probe log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeStep {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// Full result of a probe run.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub target: String,
    pub steps: Vec<ProbeStep>,
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    fn new(config: &DbConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            target: config.display_url(),
            steps: Vec::new(),
            outcome: ProbeOutcome::Ready,
        }
    }

    fn step(&mut self, name: &'static str, ok: bool, detail: impl Into<String>) {
        let detail = detail.into();
        debug!(step = name, ok, %detail, "probe step");
        self.steps.push(ProbeStep { name, ok, detail });
    }

    fn finish(mut self, outcome: ProbeOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.outcome == ProbeOutcome::Ready
    }

    /// What the operator should do next.
    pub fn hint(&self) -> String {
        let (host, port, db) = (&self.host, self.port, &self.database);
        match &self.outcome {
            ProbeOutcome::Ready => "database is ready; run `stoma seed` to load demo data".to_owned(),
            ProbeOutcome::NeedsInit { .. } => {
                format!("run `stoma db-init` to create the tables in {db}")
            }
            ProbeOutcome::NeedsSchemaCreation => {
                format!("database {db} was created; run `stoma db-init` next")
            }
            ProbeOutcome::ConnectionFailed(err) => match err {
                ConnectionError::AuthDenied(_) => format!(
                    "check DB_USER / DB_PASSWORD and that the user may access {db} from this host"
                ),
                ConnectionError::Refused(_) => {
                    format!("check that the MySQL service is running and listening on {host}:{port}")
                }
                ConnectionError::TimedOut => format!(
                    "check network reachability of {host}:{port} (DB_HOST, firewall, security groups)"
                ),
                ConnectionError::Other(_) => {
                    "check the connection settings (DB_HOST, DB_PORT, DB_USER)".to_owned()
                }
            },
        }
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diagnosing {}", self.target)?;
        for step in &self.steps {
            let mark = if step.ok { "ok" } else { "!!" };
            writeln!(f, "  [{mark}] {:<9} {}", step.name, step.detail)?;
        }
        writeln!(f, "Outcome: {}", self.outcome.label())?;
        write!(f, "Hint:    {}", self.hint())
    }
}

/// Run the diagnostic sequence against `config`.
///
/// Creates the configured database when it is missing; nothing else is
/// written.
pub async fn run_probe(config: &DbConfig, options: &ProbeOptions) -> ProbeReport {
    let mut report = ProbeReport::new(config);

    let server = config.server_options();
    let connect = MySqlConnection::connect_with(&server);
    let mut conn: MySqlConnection =
        match tokio::time::timeout(options.connect_timeout, connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                let err = ConnectionError::classify(&e)
                    .unwrap_or_else(|| ConnectionError::Other(e.to_string()));
                warn!(error = %err, target = %report.target, "probe connection failed");
                report.step("connect", false, err.to_string());
                return report.finish(ProbeOutcome::ConnectionFailed(err));
            }
            Err(_) => {
                warn!(
                    timeout_ms = options.connect_timeout.as_millis() as u64,
                    target = %report.target,
                    "probe connection timed out"
                );
                report.step(
                    "connect",
                    false,
                    format!("no answer within {:?}", options.connect_timeout),
                );
                return report.finish(ProbeOutcome::ConnectionFailed(ConnectionError::TimedOut));
            }
        };
    report.step(
        "connect",
        true,
        format!("connected to {}:{}", config.host, config.port),
    );

    let outcome = check_schema(&mut conn, config, &mut report).await;
    if let Err(e) = conn.close().await {
        debug!(error = %e, "closing probe connection failed");
    }
    report.finish(outcome)
}

async fn check_schema(
    conn: &mut MySqlConnection,
    config: &DbConfig,
    report: &mut ProbeReport,
) -> ProbeOutcome {
    let db = config.database.as_str();

    let exists = match pool::database_exists(&mut *conn, db).await {
        Ok(exists) => exists,
        Err(e) => return query_failed(report, "database", e.into()),
    };

    if !exists {
        return match pool::create_database(&mut *conn, db).await {
            Ok(()) => {
                report.step("database", false, format!("{db} was missing; created it"));
                ProbeOutcome::NeedsSchemaCreation
            }
            Err(e) => query_failed(report, "database", e),
        };
    }
    report.step("database", true, format!("{db} exists"));

    let tables = match pool::list_tables(&mut *conn, db).await {
        Ok(tables) => tables,
        Err(e) => return query_failed(report, "tables", e.into()),
    };
    let missing: Vec<String> = REQUIRED_TABLES
        .iter()
        .filter(|required| !tables.iter().any(|t| t == *required))
        .map(|t| (*t).to_owned())
        .collect();

    if missing.is_empty() {
        report.step("tables", true, format!("{} tables present", tables.len()));
        ProbeOutcome::Ready
    } else {
        report.step("tables", false, format!("missing {}", missing.join(", ")));
        ProbeOutcome::NeedsInit { missing }
    }
}

fn query_failed(report: &mut ProbeReport, step: &'static str, err: StoreError) -> ProbeOutcome {
    let err = match err {
        StoreError::Connection(conn) => conn,
        other => ConnectionError::Other(other.to_string()),
    };
    report.step(step, false, err.to_string());
    ProbeOutcome::ConnectionFailed(err)
}
