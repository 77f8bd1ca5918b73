//! Transient-vs-fatal error classification.
//!
//! Both the request executor (GET retries) and the realtime connection
//! manager (reconnects) consult [`classify`]; neither carries its own rules.

use crate::error::PocketLinkError;
use std::error::Error as StdError;
use std::io;

/// Outcome of classifying an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network-level interruption; retrying may succeed.
    Transient,
    /// Anything else; surface to the caller and stop.
    Fatal,
}

/// Lower-cased message fragments that mark a failure as transient.
const TRANSIENT_FRAGMENTS: &[&str] = &[
    "connection refused",
    "connection reset",
    "broken pipe",
    "unexpected eof",
    "unexpected end of file",
    "stream disconnected",
    "connection closed before message completed",
];

/// Classify an error as transient or fatal.
pub fn classify(err: &PocketLinkError) -> ErrorClass {
    match err {
        PocketLinkError::Cancelled
        | PocketLinkError::Timeout(_)
        | PocketLinkError::EventReceiverDropped => ErrorClass::Fatal,
        PocketLinkError::Disconnected => ErrorClass::Transient,
        PocketLinkError::Api(_)
        | PocketLinkError::RetriesExhausted { .. }
        | PocketLinkError::Serialization(_)
        | PocketLinkError::Configuration(_)
        | PocketLinkError::Authentication(_)
        | PocketLinkError::NotFound(_) => ErrorClass::Fatal,
        PocketLinkError::Http(e) if e.is_timeout() || e.is_connect() => ErrorClass::Transient,
        PocketLinkError::Io(e) if is_transient_io(e) => ErrorClass::Transient,
        other => {
            if chain_has_transient_io(other) || chain_mentions_transient(other) {
                ErrorClass::Transient
            } else {
                ErrorClass::Fatal
            }
        },
    }
}

/// Shorthand for `classify(err) == ErrorClass::Transient`.
pub fn is_transient(err: &PocketLinkError) -> bool {
    classify(err) == ErrorClass::Transient
}

fn is_transient_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

fn chain_has_transient_io(err: &PocketLinkError) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if is_transient_io(io_err) {
                return true;
            }
            // io::Error::source() skips the wrapped payload itself
            let wrapped = io_err.get_ref().and_then(|inner| inner.downcast_ref::<io::Error>());
            if wrapped.map_or(false, is_transient_io) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn chain_mentions_transient(err: &PocketLinkError) -> bool {
    let mut text = err.to_string().to_lowercase();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(" | ");
        text.push_str(&cause.to_string().to_lowercase());
        source = cause.source();
    }
    TRANSIENT_FRAGMENTS.iter().any(|fragment| text.contains(fragment))
}
