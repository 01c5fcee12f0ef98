use std::env;

use chrono::FixedOffset;
use sqlx::mysql::MySqlConnectOptions;
use tracing::warn;

/// Database configuration.
///
/// Each field can come from its own environment variable (`DB_HOST`,
/// `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_TIMEZONE`) through
/// [`DbConfig::from_env_over`]. `Default` holds the local development
/// server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Name of the database that holds the care plan tables.
    pub database: String,
    /// Session time zone as a UTC offset, e.g. `+08:00`.
    pub timezone: String,
}

impl DbConfig {
    pub const DEFAULT_HOST: &str = "localhost";
    pub const DEFAULT_PORT: u16 = 3306;
    pub const DEFAULT_USER: &str = "root";
    pub const DEFAULT_PASSWORD: &str = "";
    pub const DEFAULT_DATABASE: &str = "stoma_care_db";
    pub const DEFAULT_TIMEZONE: &str = "+08:00";

    /// Overlay the `DB_*` environment variables on `base`.
    ///
    /// An unparsable `DB_PORT` is reported and `base.port` kept.
    pub fn from_env_over(base: Self) -> Self {
        let port = match env::var("DB_PORT") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, port = base.port, "DB_PORT is not a valid port, ignoring it");
                base.port
            }),
            Err(_) => base.port,
        };

        Self {
            host: env::var("DB_HOST").unwrap_or(base.host),
            port,
            user: env::var("DB_USER").unwrap_or(base.user),
            password: env::var("DB_PASSWORD").unwrap_or(base.password),
            database: env::var("DB_NAME").unwrap_or(base.database),
            timezone: env::var("DB_TIMEZONE").unwrap_or(base.timezone),
        }
    }

    /// Same config pointed at a different database on the same server.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Connection options for the server itself, without selecting a
    /// database. Used to create the database when it does not exist yet.
    pub fn server_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .charset("utf8mb4")
            .timezone(Some(self.timezone.clone()))
    }

    /// Connection options for the configured database.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        self.server_options().database(&self.database)
    }

    /// Password-free URL for log lines and operator output.
    pub fn display_url(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    /// Parse [`Self::timezone`] into a fixed UTC offset.
    ///
    /// Returns `None` unless the value has the `±HH:MM` form.
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        let tz = self.timezone.trim();
        let (sign, rest) = match tz.as_bytes().first()? {
            b'+' => (1, &tz[1..]),
            b'-' => (-1, &tz[1..]),
            _ => return None,
        };
        let (hours, minutes) = rest.split_once(':')?;
        let hours: i32 = hours.parse().ok()?;
        let minutes: i32 = minutes.parse().ok()?;
        if hours > 14 || minutes > 59 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_owned(),
            port: Self::DEFAULT_PORT,
            user: Self::DEFAULT_USER.to_owned(),
            password: Self::DEFAULT_PASSWORD.to_owned(),
            database: Self::DEFAULT_DATABASE.to_owned(),
            timezone: Self::DEFAULT_TIMEZONE.to_owned(),
        }
    }
}
