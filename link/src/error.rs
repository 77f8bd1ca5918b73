//! Error types for pocket-link.
//!
//! Every fallible operation in the crate returns [`PocketLinkError`]. Whether
//! an error is worth retrying is decided in one place, [`crate::classify`].

use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Result type for pocket-link operations
pub type Result<T> = std::result::Result<T, PocketLinkError>;

/// Errors that can occur while talking to the backend
#[derive(Debug, Error)]
pub enum PocketLinkError {
    /// Transport-level failure reported by the HTTP client
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raw I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request or response body could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend answered with a status outside `[200, 300)`
    #[error("{0}")]
    Api(ApiError),

    /// An idempotent request failed on every attempt
    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<PocketLinkError>,
    },

    /// The realtime stream ended; the connection manager reconnects on this
    #[error("realtime stream disconnected")]
    Disconnected,

    /// A bounded wait elapsed (realtime startup, readiness polling)
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Nobody is listening on the realtime event channel anymore
    #[error("realtime event receiver dropped")]
    EventReceiverDropped,

    /// The realtime worker stopped without producing a session
    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PocketLinkError {
    /// The structured API error, if the backend produced one.
    ///
    /// Looks through [`PocketLinkError::RetriesExhausted`] so callers can
    /// inspect the last status code of an exhausted read.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            Self::RetriesExhausted { last, .. } => last.api_error(),
            _ => None,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        self.api_error().map(|err| err.status)
    }
}

impl From<ApiError> for PocketLinkError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

/// A non-success response from the backend.
///
/// `message` and `data` are parsed best-effort from the JSON body; a missing or
/// malformed body leaves them empty rather than failing.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub body: Bytes,
    pub message: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ApiError {
    /// Build an error from a status code and the raw response body.
    pub fn from_response(status: u16, body: Bytes) -> Self {
        let parsed: ErrorPayload = serde_json::from_slice(&body).unwrap_or_default();
        Self {
            status,
            body,
            message: parsed.message,
            data: parsed.data.unwrap_or_default(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut msg = self.message.trim().to_string();
        if msg.is_empty() {
            msg = String::from_utf8_lossy(&self.body).trim().to_string();
        }
        if msg.is_empty() {
            msg = reqwest::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or("unknown status")
                .to_string();
        }
        write!(f, "http {}: {}", self.status, msg)
    }
}
