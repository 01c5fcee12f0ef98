//! Configuration file management for stoma.
//!
//! Provides a TOML-based config file at `~/.config/stoma/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use stoma_core::deploy::ClientConfig;
use stoma_core::session::{SessionConfig, SessionError, TOKEN_SECRET_ENV};
use stoma_db::config::DbConfig;

/// Environment variable overriding the client's API base URL.
pub const API_URL_ENV: &str = "STOMA_API_URL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded token secret (64 hex chars = 32 bytes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the stoma config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/stoma` or `~/.config/stoma`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("stoma");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("stoma")
}

/// Return the path to the stoma config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Return the path of the client session file.
pub fn session_path() -> PathBuf {
    config_dir().join("session.json")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The file holds the database password and the token secret.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Token secret generation
// -----------------------------------------------------------------------

/// Generate a random token secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_token_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Database settings given on the command line.
#[derive(Debug, Default, Clone)]
pub struct DbOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub database: Option<String>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct StomaConfig {
    pub db_config: DbConfig,
    /// `None` when no token secret is configured anywhere.
    pub session_config: Option<SessionConfig>,
    pub api_base_url: Option<String>,
}

impl DatabaseSection {
    /// File values laid over the built-in defaults.
    fn over_defaults(&self) -> DbConfig {
        let defaults = DbConfig::default();
        DbConfig {
            host: self.host.clone().unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            user: self.user.clone().unwrap_or(defaults.user),
            password: self.password.clone().unwrap_or(defaults.password),
            database: self.name.clone().unwrap_or(defaults.database),
            timezone: self.timezone.clone().unwrap_or(defaults.timezone),
        }
    }
}

impl DbOverrides {
    fn apply(&self, mut config: DbConfig) -> DbConfig {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        config
    }
}

impl StomaConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Database: `--db-*` flags > `DB_HOST`, `DB_PORT`, `DB_USER`,
    ///   `DB_PASSWORD`, `DB_NAME`, `DB_TIMEZONE` > `[database]` > defaults
    /// - Token secret: `STOMA_TOKEN_SECRET` env > `auth.token_secret` (hex) > none
    /// - API URL: `STOMA_API_URL` env > `client.api_base_url` > build default
    pub fn resolve(cli: &DbOverrides) -> Result<Self> {
        let file = load_config().ok().unwrap_or_default();
        Self::resolve_with(cli, &file)
    }

    fn resolve_with(cli: &DbOverrides, file: &ConfigFile) -> Result<Self> {
        let db_config = cli.apply(DbConfig::from_env_over(file.database.over_defaults()));

        let session_config = match SessionConfig::from_env() {
            Ok(config) => Some(config),
            Err(SessionError::MissingSecret) => match file.auth.token_secret.as_deref() {
                Some(secret_hex) => Some(
                    SessionConfig::from_hex(secret_hex)
                        .context("invalid hex in config file token_secret")?,
                ),
                None => None,
            },
            Err(e) => return Err(e).context("STOMA_TOKEN_SECRET env var is not valid hex"),
        };

        let api_base_url = std::env::var(API_URL_ENV)
            .ok()
            .or_else(|| file.client.api_base_url.clone());

        Ok(Self {
            db_config,
            session_config,
            api_base_url,
        })
    }

    /// The token secret, or an error telling the operator how to set one.
    pub fn require_session_config(&self) -> Result<&SessionConfig> {
        self.session_config.as_ref().context(
            "token secret not found; set STOMA_TOKEN_SECRET or run `stoma init` to create a config file",
        )
    }

    /// The build's client configuration with any configured API URL applied.
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::current();
        match &self.api_base_url {
            Some(url) => config.with_api_base_url(url.clone()),
            None => config,
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
