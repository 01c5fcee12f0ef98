//! Nurse and patient client shells.
//!
//! Shells are built from an explicit [`ClientContext`] (static client
//! configuration plus the current session) and a [`CarePlanSource`]. There
//! is no process-wide client state.

pub mod shell;
pub mod source;
pub mod view;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deploy::ClientConfig;
use crate::session::UserType;

pub use shell::{Notice, NurseShell, PatientShell, PlanView, Screen};
pub use source::{CarePlanSource, ClientError, HttpSource};
pub use view::{CompletionFilter, Progress};

/// The logged-in identity of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub user_type: UserType,
    /// Signed bearer token; absent for simulated sessions.
    pub token: Option<String>,
    /// `true` when the session was made up locally from `auto_login`.
    #[serde(default)]
    pub simulated: bool,
    pub logged_in_at: DateTime<Utc>,
}

impl Session {
    /// A session backed by a server-issued token.
    pub fn issued(username: impl Into<String>, user_type: UserType, token: String) -> Self {
        Self {
            username: username.into(),
            user_type,
            token: Some(token),
            simulated: false,
            logged_in_at: Utc::now(),
        }
    }

    /// A local-only session with no credentials.
    pub fn simulated(username: impl Into<String>, user_type: UserType) -> Self {
        Self {
            username: username.into(),
            user_type,
            token: None,
            simulated: true,
            logged_in_at: Utc::now(),
        }
    }
}

/// JSON file holding the current session of this client.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored session, or `None` when nothing is stored.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read session file {}", self.path.display()))?;
        let session = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse session file {}", self.path.display()))?;
        Ok(Some(session))
    }

    /// Persist `session`, replacing any stored one. The file is private to
    /// the owner on Unix.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let contents = serde_json::to_string_pretty(session).context("failed to serialize session")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("failed to write session file {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)
                .with_context(|| format!("failed to set permissions on {}", self.path.display()))?;
        }

        debug!(path = %self.path.display(), user = %session.username, "session saved");
        Ok(())
    }

    /// Remove the stored session. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove session file {}", self.path.display())),
        }
    }
}

/// Everything a shell needs to know about its environment.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub config: ClientConfig,
    pub session: Option<Session>,
}

impl ClientContext {
    pub fn new(config: ClientConfig, session: Option<Session>) -> Self {
        Self { config, session }
    }

    /// Build the context a client starts with.
    ///
    /// A stored session wins. Otherwise a configured `auto_login` yields a
    /// simulated session, which is not written back to `store`.
    pub fn bootstrap(config: ClientConfig, store: &SessionStore) -> Result<Self> {
        if let Some(session) = store.load()? {
            debug!(user = %session.username, "restored stored session");
            return Ok(Self::new(config, Some(session)));
        }

        let session = config.auto_login.as_ref().map(|auto| {
            info!(
                user = %auto.username,
                user_type = %auto.user_type,
                "no stored session; simulating auto login"
            );
            Session::simulated(auto.username.clone(), auto.user_type)
        });
        Ok(Self::new(config, session))
    }

    /// Bearer token of the current session, if it has one.
    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.token.as_deref())
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeployTarget;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("stoma").join("session.json"))
    }

    #[test]
    fn load_from_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load().unwrap(), None);
    }

    #[test]
    fn save_load_clear_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let session = Session::issued("nurse01", UserType::Nurse, "stoma_st_x".to_owned());

        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn saved_session_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save(&Session::simulated("demo", UserType::Patient))
            .unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_session_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn bootstrap_prefers_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let stored = Session::issued("nurse01", UserType::Nurse, "tok".to_owned());
        store.save(&stored).unwrap();

        let ctx =
            ClientContext::bootstrap(ClientConfig::for_target(DeployTarget::Development), &store)
                .unwrap();
        assert_eq!(ctx.session, Some(stored));
        assert_eq!(ctx.token(), Some("tok"));
    }

    #[test]
    fn bootstrap_simulates_auto_login_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let ctx =
            ClientContext::bootstrap(ClientConfig::for_target(DeployTarget::Development), &store)
                .unwrap();
        let session = ctx.session.as_ref().expect("auto login session");
        assert!(session.simulated);
        assert_eq!(session.user_type, UserType::Patient);
        assert_eq!(ctx.token(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn bootstrap_without_auto_login_has_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ClientContext::bootstrap(
            ClientConfig::for_target(DeployTarget::Production),
            &store_in(&dir),
        )
        .unwrap();
        assert!(!ctx.is_logged_in());
    }
}
