//! Main client with builder pattern.
//!
//! Provides the primary interface for talking to the backend: raw JSON
//! requests, auth flows, typed collections, batches, health checks and the
//! realtime connection.

use crate::{
    auth::TokenStore,
    backoff::Backoff,
    batch::Batch,
    collections::Collection,
    config::{normalize_base_url, ClientConfig},
    error::{PocketLinkError, Result},
    realtime::{EventReceiver, RealtimeConnection, RealtimeHandlers},
    request::{RequestExecutor, RequestOptions, NO_BODY},
    timeouts::{PocketLinkTimeouts, RetryPolicy},
};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Client handle for one backend.
///
/// Cloning is cheap; clones share the HTTP connection pool, the auth token and
/// the cancellation token.
///
/// # Examples
///
/// ```rust,no_run
/// use pocket_link::PocketLinkClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PocketLinkClient::builder()
///     .base_url("http://127.0.0.1:8090")
///     .build()?;
///
/// client.login_superuser("admin@example.com", "secret").await?;
/// client.health().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PocketLinkClient {
    base_url: String,
    tokens: TokenStore,
    executor: RequestExecutor,
    timeouts: PocketLinkTimeouts,
    cancel: CancellationToken,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PocketLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> PocketLinkClientBuilder {
        PocketLinkClientBuilder::new()
    }

    /// Build a client from a [`ClientConfig`] and log in with its credentials,
    /// if any.
    pub async fn from_config(config: ClientConfig) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(url) = &config.base_url {
            builder = builder.base_url(url);
        }
        if let Some(secs) = config.timeout_secs.filter(|secs| *secs > 0) {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        if let Some(credentials) = &config.credentials {
            client.login_with(credentials).await?;
        }
        Ok(client)
    }

    /// Normalized base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The request executor shared by every helper of this client.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn timeouts(&self) -> &PocketLinkTimeouts {
        &self.timeouts
    }

    /// Token cancelling every request and realtime connection of this client.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn set_token(&self, token: impl Into<String>) {
        self.tokens.set(token);
    }

    pub fn token(&self) -> Option<String> {
        self.tokens.get()
    }

    pub fn clear_token(&self) {
        self.tokens.clear();
    }

    /// Send a JSON request and decode the response.
    ///
    /// GET requests are retried on transient failures; see [`RequestExecutor`].
    pub async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.executor.execute(method, path, options, body).await
    }

    /// Typed CRUD helpers for the collection `name`.
    pub fn collection<T: DeserializeOwned>(&self, name: impl Into<String>) -> Collection<T> {
        Collection::new(self.clone(), name)
    }

    /// Start an empty batch bound to this client.
    pub fn batch(&self) -> Batch {
        Batch::new(self.clone())
    }

    /// Create a realtime connection and its event receiver.
    pub fn realtime(&self) -> (RealtimeConnection, EventReceiver) {
        RealtimeConnection::new(self.clone())
    }

    /// Realtime connection with lifecycle callbacks.
    pub fn realtime_with_handlers(
        &self,
        handlers: RealtimeHandlers,
    ) -> (RealtimeConnection, EventReceiver) {
        RealtimeConnection::with_handlers(self.clone(), handlers)
    }

    /// Check `GET /api/health`.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.executor
            .execute(Method::GET, "/api/health", &RequestOptions::default(), NO_BODY)
            .await
    }

    /// Poll [`health`](Self::health) until it succeeds or `timeout` elapses.
    ///
    /// A zero timeout uses [`PocketLinkTimeouts::ready_timeout`].
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let timeout = if timeout.is_zero() {
            self.timeouts.ready_timeout
        } else {
            timeout
        };
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800));

        loop {
            match self.health().await {
                Ok(_) => return Ok(()),
                Err(PocketLinkError::Cancelled) => return Err(PocketLinkError::Cancelled),
                Err(e) => log::debug!("[PB_HTTP] Backend not ready yet: {}", e),
            }
            if Instant::now() >= deadline {
                return Err(PocketLinkError::Timeout(format!(
                    "server not ready within {:?}",
                    timeout
                )));
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PocketLinkError::Cancelled),
                _ = tokio::time::sleep(backoff.next_delay()) => {},
            }
        }
    }
}

/// Builder for configuring [`PocketLinkClient`] instances.
pub struct PocketLinkClientBuilder {
    base_url: Option<String>,
    timeouts: PocketLinkTimeouts,
    retry: RetryPolicy,
    token: Option<String>,
    http_client: Option<reqwest::Client>,
    cancel: Option<CancellationToken>,
}

impl PocketLinkClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            timeouts: PocketLinkTimeouts::default(),
            retry: RetryPolicy::default(),
            token: None,
            http_client: None,
            cancel: None,
        }
    }

    /// Set the base URL of the backend (default `http://127.0.0.1:8090`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the full timeout configuration.
    ///
    /// This overrides an earlier `timeout()` call.
    pub fn timeouts(mut self, timeouts: PocketLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the retry budget for GET requests
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Start with a bearer token already set
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Use a preconfigured HTTP client.
    ///
    /// It must not carry a total request timeout, or the realtime stream is
    /// cut off when it elapses.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Tie the client's lifetime to an outer cancellation token.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<PocketLinkClient> {
        let base_url = normalize_base_url(self.base_url.as_deref().unwrap_or_default());
        reqwest::Url::parse(&base_url).map_err(|e| {
            PocketLinkError::Configuration(format!("invalid base_url '{}': {}", base_url, e))
        })?;

        // Per-request timeouts are applied by the executor so the long-lived
        // event stream is not subject to them.
        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(self.timeouts.connection_timeout)
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .map_err(|e| PocketLinkError::Configuration(e.to_string()))?,
        };

        let tokens = match self.token {
            Some(token) => TokenStore::with_token(token),
            None => TokenStore::new(),
        };
        let cancel = self.cancel.unwrap_or_default();

        let executor = RequestExecutor::new(
            base_url.clone(),
            http_client,
            tokens.clone(),
            self.timeouts.clone(),
            self.retry,
            cancel.clone(),
        );

        log::debug!("[PB_HTTP] Client configured for {}", base_url);
        Ok(PocketLinkClient {
            base_url,
            tokens,
            executor,
            timeouts: self.timeouts,
            cancel,
        })
    }
}
