//! Access-token handling.
//!
//! The engine never runs an OAuth flow. It consumes tokens from a `TokenSource`
//! (in practice a JSON file maintained by an external helper) through an
//! `Authorizer`, which caches the current credential and serialises refreshes.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Tokens closer than this to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Bearer token plus absolute expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCredential {
    #[serde(rename = "access_token")]
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessCredential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        AccessCredential {
            token: token.into(),
            expires_at,
        }
    }

    /// True if the token stays valid for at least `margin` after `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }
}

/// Supplies bearer tokens to the executor.
pub trait Authorizer: Send + Sync {
    /// A token valid for at least a few more seconds; refreshes if needed.
    fn current_token(&self) -> Result<String, EngineError>;

    /// Discard the cached token and obtain a new one.
    fn force_refresh(&self) -> Result<(), EngineError>;
}

/// Produces a fresh credential on demand.
pub trait TokenSource: Send + Sync {
    fn fetch(&self) -> Result<AccessCredential, EngineError>;
}

/// Caches a credential from a `TokenSource`.
///
/// The refresh-and-read sequence runs under one lock, so concurrent transfers
/// sharing an authorizer never refresh twice or observe a half-updated token.
pub struct CachedAuthorizer<S> {
    source: S,
    cached: Mutex<Option<AccessCredential>>,
}

impl<S: TokenSource> CachedAuthorizer<S> {
    pub fn new(source: S) -> Self {
        CachedAuthorizer {
            source,
            cached: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<AccessCredential>> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: TokenSource> Authorizer for CachedAuthorizer<S> {
    fn current_token(&self) -> Result<String, EngineError> {
        let mut cached = self.lock();
        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(Utc::now(), Duration::seconds(EXPIRY_MARGIN_SECS)) {
                return Ok(credential.token.clone());
            }
        }

        let credential = self.source.fetch()?;
        if !credential.is_fresh(Utc::now(), Duration::zero()) {
            return Err(EngineError::Auth(format!(
                "token source returned a token that expired at {}",
                credential.expires_at
            )));
        }
        tracing::debug!(expires_at = %credential.expires_at, "access token refreshed");
        let token = credential.token.clone();
        *cached = Some(credential);
        Ok(token)
    }

    fn force_refresh(&self) -> Result<(), EngineError> {
        let mut cached = self.lock();
        let credential = self.source.fetch()?;
        tracing::debug!(expires_at = %credential.expires_at, "access token force-refreshed");
        *cached = Some(credential);
        Ok(())
    }
}

/// Token file written by an external OAuth helper.
///
/// Format: `{"access_token": "...", "expires_at": "2026-01-01T00:00:00Z"}`.
/// The file is re-read on every refresh so a helper can rotate it in place.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenFile { path: path.into() }
    }
}

impl TokenSource for TokenFile {
    fn fetch(&self) -> Result<AccessCredential, EngineError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            EngineError::Auth(format!("cannot read token file {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            EngineError::Auth(format!("malformed token file {}: {e}", self.path.display()))
        })
    }
}

/// A fixed token that never expires. Useful for pre-issued tokens and tests.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

impl Authorizer for StaticToken {
    fn current_token(&self) -> Result<String, EngineError> {
        Ok(self.0.clone())
    }

    fn force_refresh(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
