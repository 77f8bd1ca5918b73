//! Client configuration loading.
//!
//! # Configuration Format
//!
//! ```toml
//! base_url = "http://127.0.0.1:8090"  # backend URL
//! timeout_secs = 15                   # per-request timeout
//!
//! [credentials]
//! kind = "superuser"                  # user | superuser | admin
//! email = "admin@example.com"
//! password = "secret"
//! # collection = "users"             # only for kind = "user"
//! ```
//!
//! Environment variables (`POCKETBASE_URL`, `POCKETBASE_TIMEOUT_SECS`,
//! `POCKETBASE_SUPERUSER_EMAIL`/`POCKETBASE_SUPERUSER_PASSWORD`,
//! `POCKETBASE_USER_EMAIL`/`POCKETBASE_USER_PASSWORD`/`POCKETBASE_USER_COLLECTION`)
//! are read by [`ClientConfig::from_env`].

use crate::auth::DEFAULT_USER_COLLECTION;
use crate::error::{PocketLinkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8090";

/// Client settings loaded from a file or the environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend URL; empty means [`DEFAULT_BASE_URL`].
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds (default: 15)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Credentials used to log in right after the client is built
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Password credentials for one of the backend's auth flows.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    /// A record of an auth collection.
    User {
        #[serde(default = "default_user_collection")]
        collection: String,
        email: String,
        password: String,
    },
    /// A superuser account.
    Superuser { email: String, password: String },
    /// An administrator; tries the superuser flow, then the legacy admin one.
    Admin { email: String, password: String },
}

fn default_user_collection() -> String {
    DEFAULT_USER_COLLECTION.to_string()
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::User {
                collection, email, ..
            } => f
                .debug_struct("User")
                .field("collection", collection)
                .field("email", email)
                .finish_non_exhaustive(),
            Credentials::Superuser { email, .. } => f
                .debug_struct("Superuser")
                .field("email", email)
                .finish_non_exhaustive(),
            Credentials::Admin { email, .. } => f
                .debug_struct("Admin")
                .field("email", email)
                .finish_non_exhaustive(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PocketLinkError::Configuration(format!("TOML parse error: {}", e)))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PocketLinkError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Read configuration from `POCKETBASE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Fill in any field still unset from the environment.
    pub fn with_env_fallback(mut self) -> Result<Self> {
        let env = Self::from_env()?;
        if self.base_url.is_none() {
            self.base_url = env.base_url;
        }
        if self.timeout_secs.is_none() {
            self.timeout_secs = env.timeout_secs;
        }
        if self.credentials.is_none() {
            self.credentials = env.credentials;
        }
        Ok(self)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let timeout_secs = match get("POCKETBASE_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                PocketLinkError::Configuration(format!(
                    "POCKETBASE_TIMEOUT_SECS must be an integer: {}",
                    e
                ))
            })?),
            None => None,
        };

        let superuser = get("POCKETBASE_SUPERUSER_EMAIL")
            .zip(get("POCKETBASE_SUPERUSER_PASSWORD"))
            .map(|(email, password)| Credentials::Superuser { email, password });
        let user = get("POCKETBASE_USER_EMAIL")
            .zip(get("POCKETBASE_USER_PASSWORD"))
            .map(|(email, password)| Credentials::User {
                collection: get("POCKETBASE_USER_COLLECTION")
                    .unwrap_or_else(default_user_collection),
                email,
                password,
            });

        Ok(Self {
            base_url: get("POCKETBASE_URL"),
            timeout_secs,
            credentials: user.or(superuser),
        })
    }
}

/// Trim the URL and drop trailing slashes; empty input yields
/// [`DEFAULT_BASE_URL`].
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    url.trim_end_matches('/').to_string()
}
