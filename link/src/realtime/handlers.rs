//! Connection lifecycle callbacks for the realtime client.
//!
//! - [`on_connect`](RealtimeHandlers::on_connect): a session was established
//!   (receives the client id)
//! - [`on_disconnect`](RealtimeHandlers::on_disconnect): a live session ended
//! - [`on_error`](RealtimeHandlers::on_error): the stream failed; `recoverable`
//!   tells whether a reconnect follows
//!
//! # Example
//!
//! ```rust,no_run
//! use pocket_link::{PocketLinkClient, RealtimeHandlers};
//!
//! # async fn example(client: PocketLinkClient) -> pocket_link::Result<()> {
//! let handlers = RealtimeHandlers::new()
//!     .on_connect(|client_id| println!("session {client_id}"))
//!     .on_disconnect(|reason| println!("disconnected: {reason}"))
//!     .on_error(|error| eprintln!("realtime error: {error}"));
//!
//! let (realtime, _events) = client.realtime_with_handlers(handlers);
//! realtime.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    pub message: String,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub message: String,
    /// Whether the connection manager will reconnect after this error.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Optional lifecycle callbacks.
///
/// Callbacks run on the background worker; keep them short.
#[derive(Clone, Default)]
pub struct RealtimeHandlers {
    on_connect: Option<OnConnectCallback>,
    on_disconnect: Option<OnDisconnectCallback>,
    on_error: Option<OnErrorCallback>,
}

impl RealtimeHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn emit_connect(&self, client_id: &str) {
        if let Some(cb) = &self.on_connect {
            cb(client_id);
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }
}

impl fmt::Debug for RealtimeHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
