//! JSON request execution over HTTP with retries for idempotent reads.

use crate::{
    auth::TokenStore,
    backoff::Backoff,
    classify::is_transient,
    error::{ApiError, PocketLinkError, Result},
    timeouts::{PocketLinkTimeouts, RetryPolicy},
};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::{header, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Response bodies are read up to this many bytes (2 MiB).
pub(crate) const MAX_RESPONSE_BYTES: usize = 2 << 20;

/// Error bodies of a rejected event-stream request are read up to 1 MiB.
pub(crate) const MAX_STREAM_ERROR_BYTES: usize = 1 << 20;

/// Typed "no request body" for calls that send none.
pub(crate) const NO_BODY: Option<&()> = None;

/// Optional per-request settings.
///
/// ```rust
/// use pocket_link::RequestOptions;
///
/// let opts = RequestOptions::query("filter=(published=true)&sort=-created");
/// assert_eq!(opts.raw_query(), Some("filter=(published=true)&sort=-created"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Raw, already-encoded query string. A leading `?` is ignored.
    pub query: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying only a raw query string.
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
        }
    }

    /// The query string without a leading `?`, or `None` if empty.
    pub fn raw_query(&self) -> Option<&str> {
        let query = self.query.as_deref()?;
        let query = query.strip_prefix('?').unwrap_or(query);
        (!query.is_empty()).then_some(query)
    }
}

/// Issues JSON requests against the configured base URL.
///
/// GET requests are retried on transient transport failures and 5xx
/// responses; every other method gets exactly one attempt.
#[derive(Clone)]
pub struct RequestExecutor {
    base_url: String,
    http_client: reqwest::Client,
    tokens: TokenStore,
    timeouts: PocketLinkTimeouts,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RequestExecutor {
    pub(crate) fn new(
        base_url: String,
        http_client: reqwest::Client,
        tokens: TokenStore,
        timeouts: PocketLinkTimeouts,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            base_url,
            http_client,
            tokens,
            timeouts,
            retry,
            cancel,
        }
    }

    /// Join the base URL, `path` and an optional raw query.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = self.base_url.clone();
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(path);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Execute a request and decode the JSON response body into `T`.
    pub async fn execute<B, T>(
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
        let bytes = self.send(method, path, options, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Execute a request and ignore the response body.
    pub async fn execute_unit<B>(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.send(method, path, options, body).await.map(|_| ())
    }

    /// Execute a request and return the raw success body.
    pub async fn send<B>(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
        body: Option<&B>,
    ) -> Result<Bytes>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url_for(path, options.raw_query());
        let payload = body.map(serde_json::to_vec).transpose()?;

        let max_attempts = if method == Method::GET {
            self.retry.max_attempts.max(1)
        } else {
            1
        };
        let mut backoff = Backoff::uncapped(self.retry.initial_backoff);
        let overall_start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_start = Instant::now();
            debug!(
                "[PB_HTTP] Sending {} {} (attempt {}/{})",
                method, url, attempt, max_attempts
            );

            let failure = match self.attempt(&method, &url, payload.as_deref()).await {
                Ok((status, body)) if (200..300).contains(&status) => {
                    debug!(
                        "[PB_HTTP] Response received: status={} duration_ms={}",
                        status,
                        attempt_start.elapsed().as_millis()
                    );
                    return Ok(body);
                },
                Ok((status, body)) => {
                    let err = ApiError::from_response(status, body);
                    if !(500..=599).contains(&status) {
                        debug!("[PB_HTTP] {} {} rejected: {}", method, url, err);
                        return Err(err.into());
                    }
                    PocketLinkError::Api(err)
                },
                Err(e) if is_transient(&e) => e,
                Err(e) => {
                    warn!(
                        "[PB_HTTP] Fatal error: {} duration_ms={} total_ms={}",
                        e,
                        attempt_start.elapsed().as_millis(),
                        overall_start.elapsed().as_millis()
                    );
                    return Err(e);
                },
            };

            if max_attempts == 1 {
                return Err(failure);
            }
            if attempt >= max_attempts {
                warn!(
                    "[PB_HTTP] {} {} failed after {} attempts: {} total_ms={}",
                    method,
                    url,
                    attempt,
                    failure,
                    overall_start.elapsed().as_millis()
                );
                return Err(PocketLinkError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(failure),
                });
            }

            let delay = backoff.next_delay();
            warn!(
                "[PB_HTTP] Retrying {} {} in {}ms (attempt {}/{}): {}",
                method,
                url,
                delay.as_millis(),
                attempt,
                max_attempts,
                failure
            );
            self.sleep(delay).await?;
        }
    }

    /// Open the long-lived event stream at `path`.
    ///
    /// No total request timeout applies. A non-2xx answer is turned into
    /// [`PocketLinkError::Api`].
    pub async fn open_event_stream(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url_for(path, None);
        let request = self
            .tokens
            .apply_to_request(self.http_client.get(&url))
            .header(header::ACCEPT, "text/event-stream");

        debug!("[PB_HTTP] Opening event stream {}", url);
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PocketLinkError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = read_body_limited(response, MAX_STREAM_ERROR_BYTES).await?;
            return Err(ApiError::from_response(status.as_u16(), body).into());
        }
        Ok(response)
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        payload: Option<&[u8]>,
    ) -> Result<(u16, Bytes)> {
        let mut request = self
            .http_client
            .request(method.clone(), url)
            .timeout(self.timeouts.request_timeout);
        if let Some(bytes) = payload {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(bytes.to_vec());
        }
        let request = self.tokens.apply_to_request(request);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = read_body_limited(response, MAX_RESPONSE_BYTES).await?;
            Ok::<_, PocketLinkError>((status, body))
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PocketLinkError::Cancelled),
            result = exchange => result,
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PocketLinkError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Read at most `limit` bytes of a response body.
pub(crate) async fn read_body_limited(response: reqwest::Response, limit: usize) -> Result<Bytes> {
    let mut stream = std::pin::pin!(response.bytes_stream());
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let remaining = limit - buf.len();
        if chunk.len() >= remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
