//! Signed session tokens for nurse and patient clients.
//!
//! Tokens are HMAC-SHA256 based, scoped to a (user type, subject) pair and
//! stamped with their issue time.
//! Format: `stoma_st_<user_type>_<subject_hex>_<issued_at>_<hmac_hex>`
//!
//! The subject is hex-encoded so that user names containing underscores or
//! non-ASCII characters survive the `_`-separated layout.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token prefix used to identify stoma session tokens.
const TOKEN_PREFIX: &str = "stoma_st_";

/// Environment variable holding the hex-encoded token secret.
pub const TOKEN_SECRET_ENV: &str = "STOMA_TOKEN_SECRET";

/// Default lifetime of a session token.
pub const DEFAULT_MAX_AGE: TimeDelta = TimeDelta::days(7);

/// Tolerated clock skew for tokens stamped slightly in the future.
const MAX_CLOCK_SKEW: TimeDelta = TimeDelta::minutes(5);

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("unknown user type in token: {0}")]
    UnknownUserType(String),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("token expired (issued {issued_at})")]
    Expired { issued_at: DateTime<Utc> },

    #[error("token issued in the future ({issued_at})")]
    NotYetValid { issued_at: DateTime<Utc> },

    #[error("missing token secret")]
    MissingSecret,
}

/// Which client a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Nurse,
    Patient,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nurse => "nurse",
            Self::Patient => "patient",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nurse" => Ok(Self::Nurse),
            "patient" => Ok(Self::Patient),
            other => Err(SessionError::UnknownUserType(other.to_owned())),
        }
    }
}

/// Configuration for token issuance and validation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The HMAC secret key bytes.
    pub secret: Vec<u8>,
    /// Tokens older than this are rejected.
    pub max_age: TimeDelta,
}

impl SessionConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Build a config from a hex-encoded secret (as written by `stoma init`).
    pub fn from_hex(secret_hex: &str) -> Result<Self, SessionError> {
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| SessionError::InvalidFormat(format!("token secret is not valid hex: {e}")))?;
        if secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }
        Ok(Self::new(secret))
    }

    /// Read the secret from the `STOMA_TOKEN_SECRET` environment variable.
    pub fn from_env() -> Result<Self, SessionError> {
        let secret_hex = std::env::var(TOKEN_SECRET_ENV).map_err(|_| SessionError::MissingSecret)?;
        Self::from_hex(&secret_hex)
    }

    pub fn with_max_age(mut self, max_age: TimeDelta) -> Self {
        self.max_age = max_age;
        self
    }
}

/// Claims extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_type: UserType,
    /// User name or patient identifier the token was issued to.
    pub subject: String,
    pub issued_at: DateTime<Utc>,
}

/// Issue a token for `subject`, stamped with `issued_at`.
///
/// The HMAC-SHA256 is computed over `<user_type>:<subject>:<issued_at>`
/// with `issued_at` in Unix seconds.
pub fn issue_token(
    config: &SessionConfig,
    user_type: UserType,
    subject: &str,
    issued_at: DateTime<Utc>,
) -> String {
    let issued = issued_at.timestamp();
    let mac = compute_hmac(&config.secret, &signed_message(user_type, subject, issued));
    format!(
        "{TOKEN_PREFIX}{user_type}_{}_{issued}_{}",
        hex::encode(subject.as_bytes()),
        hex::encode(mac)
    )
}

/// Validate a token against `config` at time `now` and extract its claims.
///
/// The MAC is checked before the age so that a forged token never learns
/// whether its timestamp would have been acceptable.
pub fn validate_token(
    config: &SessionConfig,
    token: &str,
    now: DateTime<Utc>,
) -> Result<SessionClaims, SessionError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        SessionError::InvalidFormat(format!("token must start with '{TOKEN_PREFIX}'"))
    })?;

    let parts: Vec<&str> = rest.split('_').collect();
    let [user_type_str, subject_hex, issued_str, hmac_hex] = parts.as_slice() else {
        return Err(SessionError::InvalidFormat(format!(
            "expected 4 fields after prefix, found {}",
            parts.len()
        )));
    };

    let user_type: UserType = user_type_str.parse()?;

    let subject_bytes = hex::decode(subject_hex)
        .map_err(|e| SessionError::InvalidFormat(format!("invalid hex in subject: {e}")))?;
    let subject = String::from_utf8(subject_bytes)
        .map_err(|_| SessionError::InvalidFormat("subject is not valid UTF-8".to_owned()))?;

    let issued: i64 = issued_str
        .parse()
        .map_err(|e| SessionError::InvalidFormat(format!("invalid issue time: {e}")))?;
    let issued_at = DateTime::from_timestamp(issued, 0)
        .ok_or_else(|| SessionError::InvalidFormat(format!("issue time out of range: {issued}")))?;

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| SessionError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    verify_hmac_constant_time(
        &config.secret,
        &signed_message(user_type, &subject, issued),
        &provided_mac,
    )?;

    if issued_at - now > MAX_CLOCK_SKEW {
        return Err(SessionError::NotYetValid { issued_at });
    }
    if now - issued_at > config.max_age {
        return Err(SessionError::Expired { issued_at });
    }

    Ok(SessionClaims {
        user_type,
        subject,
        issued_at,
    })
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn signed_message(user_type: UserType, subject: &str, issued: i64) -> Vec<u8> {
    format!("{user_type}:{subject}:{issued}").into_bytes()
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Verify an HMAC with the `hmac` crate's constant-time `verify_slice`.
fn verify_hmac_constant_time(
    key: &[u8],
    message: &[u8],
    expected_mac: &[u8],
) -> Result<(), SessionError> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.verify_slice(expected_mac)
        .map_err(|_| SessionError::HmacMismatch)
}
