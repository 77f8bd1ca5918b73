//! Timeout and retry configuration for client operations.
//!
//! Centralizes the deadlines used by plain requests, the realtime startup
//! handshake and readiness polling, plus the retry budget for reads.

use std::time::Duration;

/// Timeout configuration for pocket-link operations.
///
/// # Examples
///
/// ```rust
/// use pocket_link::PocketLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = PocketLinkTimeouts::default();
///
/// // Custom timeouts for a slow backend
/// let timeouts = PocketLinkTimeouts::builder()
///     .request_timeout(Duration::from_secs(60))
///     .realtime_connect_timeout(Duration::from_secs(15))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = PocketLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct PocketLinkTimeouts {
    /// Total time allowed for one request/response exchange.
    /// Does not apply to the realtime event stream, which is long-lived.
    /// Default: 15 seconds
    pub request_timeout: Duration,

    /// Timeout for establishing TCP (+ TLS) connections.
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// How long `RealtimeConnection::connect` waits for the backend to assign
    /// a client id.
    /// Default: 5 seconds
    pub realtime_connect_timeout: Duration,

    /// Default deadline for `PocketLinkClient::wait_ready`.
    /// Default: 10 seconds
    pub ready_timeout: Duration,
}

impl Default for PocketLinkTimeouts {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            connection_timeout: Duration::from_secs(10),
            realtime_connect_timeout: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(10),
        }
    }
}

impl PocketLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> PocketLinkTimeoutsBuilder {
        PocketLinkTimeoutsBuilder::new()
    }

    /// Shorter timeouts suitable for a backend on localhost.
    pub fn fast() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            connection_timeout: Duration::from_secs(2),
            realtime_connect_timeout: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for creating custom [`PocketLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct PocketLinkTimeoutsBuilder {
    timeouts: PocketLinkTimeouts,
}

impl PocketLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: PocketLinkTimeouts::default(),
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the request timeout in seconds.
    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set how long realtime startup waits for a client id.
    pub fn realtime_connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.realtime_connect_timeout = timeout;
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.ready_timeout = timeout;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> PocketLinkTimeouts {
        self.timeouts
    }
}

/// Retry budget for idempotent (GET) requests.
///
/// Writes are never retried; callers that need retried writes must make them
/// idempotent themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(150),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}
