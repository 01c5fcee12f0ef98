mod client_cmds;
mod config;
mod plan_cmds;
mod serve_cmd;
mod session_cmds;

#[cfg(test)]
mod test_util;

use std::time::Duration;

use clap::{Parser, Subcommand};

use stoma_core::deploy::{ClientConfig, DeployTarget};
use stoma_core::probe::{self, ProbeOptions};
use stoma_core::seed;
use stoma_core::session::UserType;
use stoma_db::config::DbConfig;
use stoma_db::pool;

use config::{DbOverrides, StomaConfig};

#[derive(Parser)]
#[command(name = "stoma", about = "Stoma patient care plan store and clients")]
struct Cli {
    /// Database host (overrides DB_HOST env var)
    #[arg(long, global = true)]
    db_host: Option<String>,

    /// Database port (overrides DB_PORT env var)
    #[arg(long, global = true)]
    db_port: Option<u16>,

    /// Database user (overrides DB_USER env var)
    #[arg(long, global = true)]
    db_user: Option<String>,

    /// Database name (overrides DB_NAME env var)
    #[arg(long, global = true)]
    db_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn db_overrides(&self) -> DbOverrides {
        DbOverrides {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            database: self.db_name.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a stoma config file (no database required)
    Init {
        #[arg(long, default_value = DbConfig::DEFAULT_HOST)]
        host: String,
        #[arg(long, default_value_t = DbConfig::DEFAULT_PORT)]
        port: u16,
        #[arg(long, default_value = DbConfig::DEFAULT_USER)]
        user: String,
        #[arg(long, default_value = DbConfig::DEFAULT_PASSWORD)]
        password: String,
        #[arg(long, default_value = DbConfig::DEFAULT_DATABASE)]
        name: String,
        /// Session time zone of the store, e.g. +08:00
        #[arg(long, default_value = DbConfig::DEFAULT_TIMEZONE)]
        timezone: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and apply migrations
    DbInit,
    /// Check connectivity and schema of the configured database
    Diagnose {
        /// Connect timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
    /// Seed the demo care plan for a patient (first patient by default)
    Seed {
        #[arg(long)]
        patient_id: Option<i64>,
    },
    /// Care plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Care plan item management
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Serve the care plan HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Session token management
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Show the active care plan of a patient through the API
    Tasks {
        patient_id: i64,
        /// all, pending or completed
        #[arg(long, default_value = "all")]
        filter: String,
        /// Only items whose title or description contains this text
        #[arg(long, default_value = "")]
        search: String,
        /// Flip the completion flag of this item before showing the plan
        #[arg(long)]
        toggle: Option<i64>,
        /// Use the read-only nurse view
        #[arg(long)]
        as_nurse: bool,
        /// Keep reloading the plan at the client refresh interval until Ctrl+C
        #[arg(long)]
        watch: bool,
    },
    /// Browse education articles through the API
    Education {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List the care plans of a patient
    Show { patient_id: i64 },
    /// Show one care plan with its items
    Get { plan_id: i64 },
    /// Create a care plan for a patient
    Create {
        patient_id: i64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Start date, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// End date, YYYY-MM-DD
        #[arg(long)]
        end: String,
        /// daily, weekly or custom
        #[arg(long, default_value = "daily")]
        frequency: String,
        /// active, completed or cancelled
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Change the status of a care plan
    Status { plan_id: i64, status: String },
}

#[derive(Subcommand)]
pub enum ItemCommands {
    /// Mark an item completed
    Complete {
        item_id: i64,
        /// Mark the item pending again
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Print a new session token (requires the token secret)
    Issue {
        username: String,
        #[arg(long, default_value = "patient")]
        user_type: UserType,
    },
    /// Store a session for the client commands
    Login {
        username: String,
        #[arg(long, default_value = "patient")]
        user_type: UserType,
        /// Token issued elsewhere; issued locally when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the current session
    Whoami,
}

/// Execute the `stoma init` command: write a config file with a fresh
/// token secret.
fn cmd_init(database: config::DatabaseSection, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();
    let summary = format!(
        "{}@{}:{}/{}",
        database.user.as_deref().unwrap_or_default(),
        database.host.as_deref().unwrap_or_default(),
        database.port.unwrap_or(DbConfig::DEFAULT_PORT),
        database.name.as_deref().unwrap_or_default(),
    );

    let cfg = config::ConfigFile {
        database,
        auth: config::AuthSection {
            token_secret: Some(token_secret.clone()),
        },
        client: config::ClientSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database = {summary}");
    println!(
        "  auth.token_secret = {}...{}",
        &token_secret[..8],
        &token_secret[56..]
    );
    println!();
    println!("Next: run `stoma db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `stoma db-init` command: create database and run migrations.
async fn cmd_db_init(db_config: &DbConfig) -> anyhow::Result<()> {
    println!("Initializing stoma database at {}...", db_config.display_url());

    // 1. Create the database if it does not exist.
    let created = pool::ensure_database_exists(db_config).await?;
    if created {
        println!("Created database {}.", db_config.database);
    }

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(db_config).await?;

    // 3. Run migrations.
    let result = pool::run_migrations(&db_pool).await;

    // 4. Print table counts.
    let counts = match result {
        Ok(()) => pool::table_counts(&db_pool).await,
        Err(e) => Err(e),
    };

    // 5. Clean shutdown.
    db_pool.close().await;

    let counts = counts?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }
    println!("stoma db-init complete.");
    Ok(())
}

/// Execute the `stoma diagnose` command. Always succeeds: failures are
/// part of the printed report.
async fn cmd_diagnose(db_config: &DbConfig, timeout: u64) {
    let options = ProbeOptions {
        connect_timeout: Duration::from_secs(timeout),
    };
    let report = probe::run_probe(db_config, &options).await;
    println!("{report}");
}

/// Execute the `stoma seed` command.
async fn cmd_seed(db_config: &DbConfig, patient_id: Option<i64>) -> anyhow::Result<()> {
    let db_pool = pool::create_pool(db_config).await?;
    let today = seed::store_today(db_config.utc_offset());
    let result = seed::seed_demo_plan(&db_pool, patient_id, today).await;
    db_pool.close().await;

    let report = result?;
    println!("{report}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Tasks { .. } | Commands::Education { .. } => {
            ClientConfig::current().log_filter()
        }
        _ => DeployTarget::current().default_log_filter(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let overrides = cli.db_overrides();

    match cli.command {
        Commands::Init {
            host,
            port,
            user,
            password,
            name,
            timezone,
            force,
        } => {
            let database = config::DatabaseSection {
                host: Some(host),
                port: Some(port),
                user: Some(user),
                password: Some(password),
                name: Some(name),
                timezone: Some(timezone),
            };
            cmd_init(database, force)?;
        }
        Commands::DbInit => {
            let resolved = StomaConfig::resolve(&overrides)?;
            cmd_db_init(&resolved.db_config).await?;
        }
        Commands::Diagnose { timeout } => match StomaConfig::resolve(&overrides) {
            Ok(resolved) => cmd_diagnose(&resolved.db_config, timeout).await,
            Err(e) => {
                println!("Configuration error: {e:#}");
                println!("Hint: check the DB_* environment variables and the config file.");
            }
        },
        Commands::Seed { patient_id } => {
            let resolved = StomaConfig::resolve(&overrides)?;
            cmd_seed(&resolved.db_config, patient_id).await?;
        }
        Commands::Plan { command } => {
            let resolved = StomaConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Item { command } => {
            let resolved = StomaConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_item_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = StomaConfig::resolve(&overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let state = serve_cmd::AppState {
                pool: db_pool.clone(),
                session: resolved.session_config,
            };
            let result = serve_cmd::run_serve(state, &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Session { command } => {
            let resolved = StomaConfig::resolve(&overrides)?;
            session_cmds::run_session_command(command, &resolved)?;
        }
        Commands::Tasks {
            patient_id,
            filter,
            search,
            toggle,
            as_nurse,
            watch,
        } => {
            let resolved = StomaConfig::resolve(&overrides)?;
            let options = client_cmds::TasksOptions {
                filter: filter.parse().map_err(anyhow::Error::msg)?,
                search,
                toggle,
                as_nurse,
                watch,
            };
            client_cmds::run_tasks(&resolved, patient_id, options).await?;
        }
        Commands::Education { category, search } => {
            let resolved = StomaConfig::resolve(&overrides)?;
            client_cmds::run_education(&resolved, category.as_deref(), &search).await?;
        }
    }

    Ok(())
}
