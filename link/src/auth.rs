//! Token storage and password login flows.
//!
//! The bearer token lives behind its own lock, independent of any realtime
//! session state, and is attached as `Authorization: Bearer <token>` to every
//! outgoing request while set.

use crate::{
    client::PocketLinkClient,
    config::Credentials,
    error::{PocketLinkError, Result},
    request::RequestOptions,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Characters escaped when a value is used as a single URL path segment.
pub(crate) const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode `value` for use as one path segment.
pub(crate) fn escape_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// Shared, lock-guarded bearer token.
///
/// Cloning shares the same underlying slot.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Replace the current token. An empty string clears it.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = (!token.is_empty()).then_some(token);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Copy of the current token, if any.
    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Attach `Authorization: Bearer <token>` when a token is set.
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[derive(Serialize)]
struct PasswordAuthRequest<'a> {
    identity: &'a str,
    password: &'a str,
}

/// Response of an `auth-with-password` call.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: String,
    /// The authenticated record, as returned by the backend.
    #[serde(default)]
    pub record: Option<serde_json::Value>,
}

/// Collection holding superuser accounts.
pub const SUPERUSERS_COLLECTION: &str = "_superusers";

/// Collection used for user logins when none is configured.
pub const DEFAULT_USER_COLLECTION: &str = "users";

const LEGACY_ADMIN_AUTH_PATH: &str = "/api/admins/auth-with-password";

impl PocketLinkClient {
    /// Authenticate a record of an auth collection and store its token.
    pub async fn login_user(
        &self,
        collection: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse> {
        let path = format!(
            "/api/collections/{}/auth-with-password",
            escape_segment(collection)
        );
        self.password_login(&path, email, password, "user").await
    }

    /// Authenticate against the `_superusers` collection.
    pub async fn login_superuser(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.login_user(SUPERUSERS_COLLECTION, email, password)
            .await
            .map_err(|e| relabel_empty_token(e, "superuser"))
    }

    /// Authenticate an administrator.
    ///
    /// Tries the superuser collection first and falls back to the legacy
    /// admins endpoint of older backends.
    pub async fn login_admin(&self, email: &str, password: &str) -> Result<AuthResponse> {
        match self.login_superuser(email, password).await {
            Ok(response) => Ok(response),
            Err(e) => {
                log::debug!("[PB_AUTH] Superuser login failed ({}), trying legacy admin endpoint", e);
                self.password_login(LEGACY_ADMIN_AUTH_PATH, email, password, "admin")
                    .await
            },
        }
    }

    /// Log in with whatever [`Credentials`] describe.
    pub async fn login_with(&self, credentials: &Credentials) -> Result<AuthResponse> {
        match credentials {
            Credentials::User {
                collection,
                email,
                password,
            } => self.login_user(collection, email, password).await,
            Credentials::Superuser { email, password } => {
                self.login_superuser(email, password).await
            },
            Credentials::Admin { email, password } => self.login_admin(email, password).await,
        }
    }

    async fn password_login(
        &self,
        path: &str,
        identity: &str,
        password: &str,
        kind: &str,
    ) -> Result<AuthResponse> {
        log::debug!("[PB_AUTH] Authenticating {} '{}' via {}", kind, identity, path);
        let body = PasswordAuthRequest { identity, password };
        let response: AuthResponse = self
            .executor()
            .execute(Method::POST, path, &RequestOptions::default(), Some(&body))
            .await?;

        if response.token.is_empty() {
            return Err(PocketLinkError::Authentication(format!(
                "empty token from {} login",
                kind
            )));
        }
        self.set_token(response.token.clone());
        log::debug!("[PB_AUTH] Authenticated {} '{}'", kind, identity);
        Ok(response)
    }
}

fn relabel_empty_token(err: PocketLinkError, kind: &str) -> PocketLinkError {
    match err {
        PocketLinkError::Authentication(_) => {
            PocketLinkError::Authentication(format!("empty token from {} login", kind))
        },
        other => other,
    }
}
