//! Build-time deployment target and the static client configuration tied
//! to it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::UserType;

/// Where a build is meant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployTarget {
    Development,
    Production,
}

impl DeployTarget {
    /// The target this binary was built for.
    ///
    /// `STOMA_DEPLOY_TARGET` at compile time wins; otherwise debug builds
    /// are development and release builds are production.
    pub fn current() -> Self {
        option_env!("STOMA_DEPLOY_TARGET")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(Self::from_profile)
    }

    fn from_profile() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    /// Default `tracing` filter for processes built for this target.
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production => "info",
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployTarget {
    type Err = DeployTargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(DeployTargetParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`DeployTarget`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid deploy target: {0:?} (expected development or production)")]
pub struct DeployTargetParseError(pub String);

/// Identity a development build logs in as without asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoLogin {
    pub username: String,
    pub user_type: UserType,
}

/// Static configuration consumed by the client shells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the HTTP API, without the `/api` suffix.
    pub api_base_url: String,
    /// How often a watching client reloads the open plan.
    pub refresh_interval_ms: u64,
    /// Verbose client logging.
    pub debug: bool,
    pub auto_login: Option<AutoLogin>,
}

impl ClientConfig {
    /// Configuration shipped with builds for `target`.
    pub fn for_target(target: DeployTarget) -> Self {
        match target {
            DeployTarget::Development => Self {
                api_base_url: "http://localhost:3000".to_owned(),
                refresh_interval_ms: 5_000,
                debug: true,
                auto_login: Some(AutoLogin {
                    username: "demo_patient".to_owned(),
                    user_type: UserType::Patient,
                }),
            },
            DeployTarget::Production => Self {
                api_base_url: "https://stoma-care.example.org".to_owned(),
                refresh_interval_ms: 30_000,
                debug: false,
                auto_login: None,
            },
        }
    }

    /// Configuration for this build's target.
    pub fn current() -> Self {
        Self::for_target(DeployTarget::current())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Default log filter for client front ends.
    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    /// Same configuration pointed at another API server.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_owned();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parse_accepts_aliases() {
        assert_eq!("dev".parse::<DeployTarget>().unwrap(), DeployTarget::Development);
        assert_eq!("Production".parse::<DeployTarget>().unwrap(), DeployTarget::Production);
        assert!("staging".parse::<DeployTarget>().is_err());
    }

    #[test]
    fn target_display_roundtrip() {
        for t in [DeployTarget::Development, DeployTarget::Production] {
            assert_eq!(t.to_string().parse::<DeployTarget>().unwrap(), t);
        }
    }

    #[test]
    fn production_has_no_auto_login() {
        let prod = ClientConfig::for_target(DeployTarget::Production);
        assert!(prod.auto_login.is_none());
        assert!(!prod.debug);
        assert!(prod.api_base_url.starts_with("https://"));
    }

    #[test]
    fn development_logs_in_as_demo_patient() {
        let dev = ClientConfig::for_target(DeployTarget::Development);
        let auto = dev.auto_login.expect("development auto login");
        assert_eq!(auto.user_type, UserType::Patient);
        assert!(dev.debug);
        assert!(dev.refresh_interval_ms < 30_000);
    }

    #[test]
    fn debug_build_defaults_to_development() {
        if option_env!("STOMA_DEPLOY_TARGET").is_none() && cfg!(debug_assertions) {
            assert_eq!(DeployTarget::current(), DeployTarget::Development);
        }
    }

    #[test]
    fn client_settings_follow_target() {
        let dev = ClientConfig::for_target(DeployTarget::Development);
        assert_eq!(dev.refresh_interval(), Duration::from_secs(5));
        assert_eq!(dev.log_filter(), "debug");

        let prod = ClientConfig::for_target(DeployTarget::Production);
        assert_eq!(prod.refresh_interval(), Duration::from_secs(30));
        assert_eq!(prod.log_filter(), "info");
    }

    #[test]
    fn with_api_base_url_strips_trailing_slash() {
        let config = ClientConfig::current().with_api_base_url("http://127.0.0.1:8080/");
        assert_eq!(config.api_base_url, "http://127.0.0.1:8080");
    }
}
