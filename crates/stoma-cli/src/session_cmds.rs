//! CLI handlers for `stoma session` subcommands.

use anyhow::{Context, Result};
use chrono::Utc;

use stoma_core::client::{Session, SessionStore};
use stoma_core::session::{self, SessionConfig, UserType};

use crate::SessionCommands;
use crate::config::{self, StomaConfig};

/// Dispatch a `SessionCommands` variant to the appropriate handler.
pub fn run_session_command(command: SessionCommands, resolved: &StomaConfig) -> Result<()> {
    let store = SessionStore::new(config::session_path());
    match command {
        SessionCommands::Issue {
            username,
            user_type,
        } => {
            let config = resolved.require_session_config()?;
            println!("{}", session::issue_token(config, user_type, &username, Utc::now()));
            Ok(())
        }
        SessionCommands::Login {
            username,
            user_type,
            token,
        } => cmd_login(
            &store,
            resolved.session_config.as_ref(),
            &username,
            user_type,
            token,
        ),
        SessionCommands::Logout => {
            if store.clear()? {
                println!("Logged out.");
            } else {
                println!("No stored session.");
            }
            Ok(())
        }
        SessionCommands::Whoami => cmd_whoami(&store, resolved),
    }
}

/// Store a session. A token given on the command line is checked against
/// the local secret when one is configured; without a token one is issued
/// locally, which needs the secret.
fn cmd_login(
    store: &SessionStore,
    secret: Option<&SessionConfig>,
    username: &str,
    user_type: UserType,
    token: Option<String>,
) -> Result<()> {
    let token = match (token, secret) {
        (Some(token), Some(config)) => {
            let claims = session::validate_token(config, &token, Utc::now())
                .context("token rejected")?;
            if claims.user_type != user_type {
                anyhow::bail!(
                    "token was issued to a {} but --user-type is {user_type}",
                    claims.user_type
                );
            }
            token
        }
        (Some(token), None) => token,
        (None, Some(config)) => session::issue_token(config, user_type, username, Utc::now()),
        (None, None) => anyhow::bail!(
            "no token given and no token secret configured; pass --token or run `stoma init`"
        ),
    };

    store.save(&Session::issued(username, user_type, token))?;
    println!("Logged in as {username} ({user_type}).");
    println!("Session stored at {}", store.path().display());
    Ok(())
}

fn cmd_whoami(store: &SessionStore, resolved: &StomaConfig) -> Result<()> {
    let Some(stored) = store.load()? else {
        match resolved.client_config().auto_login {
            Some(auto) => println!(
                "Not logged in; this build auto-logs in as {} ({}).",
                auto.username, auto.user_type
            ),
            None => println!("Not logged in."),
        }
        return Ok(());
    };

    println!("User:      {}", stored.username);
    println!("Type:      {}", stored.user_type);
    println!("Logged in: {}", stored.logged_in_at.format("%Y-%m-%d %H:%M:%S UTC"));

    match (stored.token.as_deref(), resolved.session_config.as_ref()) {
        (None, _) => println!("Token:     none (simulated session)"),
        (Some(_), None) => println!("Token:     present (not checked, no secret configured)"),
        (Some(token), Some(config)) => match session::validate_token(config, token, Utc::now()) {
            Ok(claims) => println!(
                "Token:     valid, issued {}",
                claims.issued_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            Err(e) => println!("Token:     invalid ({e})"),
        },
    }
    Ok(())
}
