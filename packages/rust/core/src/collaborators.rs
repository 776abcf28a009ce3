//! External collaborators: where credentials come from and who may run jobs.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use mparchive_crawler::Credentials;
use mparchive_shared::{ArchiveError, CredentialsConfig, Result, UsageClass};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Supplies the cookie map and token of a logged-in session.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<Credentials>;
}

/// Fixed credentials, e.g. parsed from command-line flags.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}

/// Reads a browser cookie string and a token from environment variables.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    cookie_var: String,
    token_var: String,
}

impl EnvCredentials {
    pub fn new(cookie_var: impl Into<String>, token_var: impl Into<String>) -> Self {
        Self {
            cookie_var: cookie_var.into(),
            token_var: token_var.into(),
        }
    }

    fn read(var: &str) -> Result<String> {
        std::env::var(var).map_err(|_| ArchiveError::config(format!("environment variable {var} is not set")))
    }
}

impl From<&CredentialsConfig> for EnvCredentials {
    fn from(config: &CredentialsConfig) -> Self {
        Self::new(&config.cookie_env, &config.token_env)
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let cookie = Self::read(&self.cookie_var)?;
        let token = Self::read(&self.token_var)?;
        let credentials = Credentials::from_cookie_header(&cookie, token);
        if credentials.is_empty() {
            return Err(ArchiveError::config(format!(
                "{} and {} must both be non-empty",
                self.cookie_var, self.token_var
            )));
        }
        debug!(cookies = credentials.cookie_count(), "credentials loaded from environment");
        Ok(credentials)
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Decides whether a job may run, and records its use once it completes.
pub trait AuthorizationGate: Send + Sync {
    /// Asked once before a job starts.
    fn authorize(&self, class: UsageClass) -> bool;
    /// Called once after a job completes; returns `false` if nothing was left to consume.
    fn consume(&self, class: UsageClass) -> bool;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl AuthorizationGate for Unmetered {
    fn authorize(&self, _class: UsageClass) -> bool {
        true
    }

    fn consume(&self, _class: UsageClass) -> bool {
        true
    }
}

/// In-memory allowance per usage class.
#[derive(Debug, Default)]
pub struct UsageQuota {
    remaining: Mutex<HashMap<UsageClass, u32>>,
}

impl UsageQuota {
    pub fn new(allowances: impl IntoIterator<Item = (UsageClass, u32)>) -> Self {
        Self {
            remaining: Mutex::new(allowances.into_iter().collect()),
        }
    }

    pub fn remaining(&self, class: UsageClass) -> u32 {
        self.remaining
            .lock()
            .map(|m| m.get(&class).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl AuthorizationGate for UsageQuota {
    fn authorize(&self, class: UsageClass) -> bool {
        self.remaining(class) > 0
    }

    fn consume(&self, class: UsageClass) -> bool {
        let Ok(mut remaining) = self.remaining.lock() else {
            warn!("usage quota lock poisoned");
            return false;
        };
        match remaining.get_mut(&class) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}
