//! Realtime events and the bounded channel that delivers them.

use crate::error::{PocketLinkError, Result};
use bytes::Bytes;
use futures_util::Stream;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Capacity of the event channel.
///
/// When it is full the background worker waits (it never drops events); the
/// wait is abandoned only when the connection is closed or cancelled.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Name of the record that establishes a session.
pub const CONNECT_EVENT: &str = "PB_CONNECT";

/// Name of the terminal event emitted when the stream fails fatally.
pub const ERROR_EVENT: &str = "PB_ERROR";

/// One event received from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeEvent {
    /// Record name (`event:` field); topic name for record changes.
    pub name: String,
    /// Raw payload (`data:` lines joined with `\n`).
    pub data: Bytes,
}

impl RealtimeEvent {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// The terminal event for a fatal stream error.
    pub(crate) fn terminal(err: &PocketLinkError) -> Self {
        let payload = serde_json::json!({ "error": err.to_string() });
        Self::new(ERROR_EVENT, payload.to_string())
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }

    pub fn is_connect(&self) -> bool {
        self.name == CONNECT_EVENT
    }

    /// Whether this is the terminal error event; nothing follows it.
    pub fn is_error(&self) -> bool {
        self.name == ERROR_EVENT
    }

    /// Message carried by a terminal error event.
    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        let payload: serde_json::Value = serde_json::from_slice(&self.data).ok()?;
        payload.get("error")?.as_str().map(str::to_string)
    }
}

/// Receiving half of the event channel.
///
/// Yields events in the order they were read from the wire. Returns `None`
/// once the connection is closed and every buffered event has been taken.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<RealtimeEvent>,
}

impl EventReceiver {
    pub(crate) fn channel() -> (mpsc::Sender<RealtimeEvent>, Self) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (tx, Self { rx })
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    /// Take an already buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventReceiver {
    type Item = RealtimeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
