//! Realtime connection manager.
//!
//! Owns one event-stream connection at a time and handles:
//!
//! - Session establishment (`PB_CONNECT` carrying a client id)
//! - Pushing the full subscription set after every new session
//! - Automatic reconnection with exponential backoff on transient failures
//! - A single terminal `PB_ERROR` event on fatal failures
//! - Cooperative cancellation via [`close`](RealtimeConnection::close)

use crate::{
    backoff::Backoff,
    classify::{classify, ErrorClass},
    client::PocketLinkClient,
    error::{PocketLinkError, Result},
    realtime::{
        event::{EventReceiver, RealtimeEvent, CONNECT_EVENT},
        handlers::{ConnectionError, DisconnectReason, RealtimeHandlers},
        registry::SubscriptionRegistry,
        sse::{SseDecoder, SseRecord},
    },
    request::RequestOptions,
};
use futures_util::StreamExt;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Endpoint serving the event stream and accepting subscription pushes.
pub const REALTIME_PATH: &str = "/api/realtime";

/// Session progress published by the worker and observed by `connect()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SessionSignal {
    /// Sessions established so far; never decreases.
    established: u64,
    /// A session is live right now.
    live: bool,
    /// The worker has exited.
    stopped: bool,
}

enum Worker {
    /// Not started yet; holds the sending half of the event channel.
    Idle(mpsc::Sender<RealtimeEvent>),
    Running(JoinHandle<()>),
    Closed,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPush<'a> {
    client_id: &'a str,
    subscriptions: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectPayload {
    #[serde(default)]
    client_id: String,
}

/// A realtime connection: one background worker, one event stream.
///
/// # Example
///
/// ```rust,no_run
/// use pocket_link::PocketLinkClient;
///
/// # async fn example(client: PocketLinkClient) -> pocket_link::Result<()> {
/// let (realtime, mut events) = client.realtime();
/// realtime.subscribe(["posts/*"]).await?;
/// realtime.connect().await?;
///
/// while let Some(event) = events.recv().await {
///     if event.is_error() {
///         eprintln!("stream failed: {:?}", event.error_message());
///         break;
///     }
///     println!("{}: {}", event.name, String::from_utf8_lossy(&event.data));
/// }
/// realtime.close().await;
/// # Ok(())
/// # }
/// ```
pub struct RealtimeConnection {
    client: PocketLinkClient,
    registry: SubscriptionRegistry,
    handlers: RealtimeHandlers,
    cancel: CancellationToken,
    signal: watch::Sender<SessionSignal>,
    push_lock: Arc<AsyncMutex<()>>,
    worker: Mutex<Worker>,
}

impl RealtimeConnection {
    /// Create an idle connection and the receiver its events arrive on.
    pub fn new(client: PocketLinkClient) -> (Self, EventReceiver) {
        Self::with_handlers(client, RealtimeHandlers::default())
    }

    /// Like [`new`](Self::new), with lifecycle callbacks.
    pub fn with_handlers(
        client: PocketLinkClient,
        handlers: RealtimeHandlers,
    ) -> (Self, EventReceiver) {
        let (events_tx, events_rx) = EventReceiver::channel();
        let (signal, _) = watch::channel(SessionSignal::default());
        let cancel = client.cancellation_token().child_token();
        let connection = Self {
            client,
            registry: SubscriptionRegistry::new(),
            handlers,
            cancel,
            signal,
            push_lock: Arc::new(AsyncMutex::new(())),
            worker: Mutex::new(Worker::Idle(events_tx)),
        };
        (connection, events_rx)
    }

    /// The live session id, if any.
    pub fn client_id(&self) -> Option<String> {
        self.registry.client_id()
    }

    /// Currently desired topics.
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.current()
    }

    /// Start the background worker (once) and wait for a session.
    ///
    /// Returns at once while a session is live. Otherwise waits until the
    /// backend assigns a client id, or fails with
    /// [`PocketLinkError::Timeout`] after
    /// [`realtime_connect_timeout`](crate::PocketLinkTimeouts::realtime_connect_timeout),
    /// [`PocketLinkError::Cancelled`] on cancellation, or
    /// [`PocketLinkError::Realtime`] if the worker stopped without a new
    /// session (the terminal event is still delivered on the channel).
    /// Streaming continues in the background after a successful return.
    pub async fn connect(&self) -> Result<()> {
        self.start()?;

        let mut signal = self.signal.subscribe();
        let seen = *signal.borrow_and_update();
        if seen.live {
            return Ok(());
        }
        let baseline = seen.established;
        let session_seen = move |s: &SessionSignal| s.live || s.established > baseline;

        let timeout = self.client.timeouts().realtime_connect_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PocketLinkError::Cancelled),
            changed = signal.wait_for(|s| session_seen(s) || s.stopped) => {
                match changed.map(|s| *s) {
                    Ok(s) if session_seen(&s) => Ok(()),
                    _ => Err(PocketLinkError::Realtime(
                        "realtime worker stopped before a session was established".to_string(),
                    )),
                }
            },
            _ = tokio::time::sleep(timeout) => Err(PocketLinkError::Timeout(format!(
                "realtime connect timeout after {:?}",
                timeout
            ))),
        }
    }

    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *worker, Worker::Closed) {
            Worker::Idle(events) => {
                let task = StreamWorker {
                    client: self.client.clone(),
                    registry: self.registry.clone(),
                    handlers: self.handlers.clone(),
                    cancel: self.cancel.clone(),
                    signal: self.signal.clone(),
                    push_lock: self.push_lock.clone(),
                    events,
                    backoff: Backoff::realtime(),
                };
                log::debug!("[PB_REALTIME] Starting realtime worker");
                *worker = Worker::Running(tokio::spawn(task.run()));
                Ok(())
            },
            running @ Worker::Running(_) => {
                *worker = running;
                Ok(())
            },
            Worker::Closed => Err(PocketLinkError::Realtime(
                "realtime connection is closed".to_string(),
            )),
        }
    }

    /// Replace the desired topics.
    ///
    /// With a live session the full new set is pushed immediately; otherwise
    /// it is pushed right after the next session is established. Pushes are
    /// serialized, so the set that was written last is also pushed last.
    pub async fn subscribe<I, S>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        let _push = self.push_lock.lock().await;
        match self.registry.set(topics.clone()) {
            Some(client_id) => push_subscriptions(&self.client, &client_id, &topics).await,
            None => Ok(()),
        }
    }

    /// Stop the worker and close the event channel.
    ///
    /// Waits until the worker has fully terminated, so no event is sent after
    /// this returns. Buffered events stay readable; the receiver then yields
    /// `None`.
    pub async fn close(&self) {
        self.cancel.cancel();
        let worker = {
            let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *worker, Worker::Closed)
        };
        if let Worker::Running(handle) = worker {
            if let Err(e) = handle.await {
                log::warn!("[PB_REALTIME] Realtime worker ended abnormally: {}", e);
            }
        }
        self.registry.clear_client_id();
        log::debug!("[PB_REALTIME] Realtime connection closed");
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// POST the full topic set for `client_id`.
async fn push_subscriptions(
    client: &PocketLinkClient,
    client_id: &str,
    topics: &[String],
) -> Result<()> {
    log::debug!(
        "[PB_REALTIME] Pushing {} subscription(s) for client {}",
        topics.len(),
        client_id
    );
    let body = SubscriptionPush {
        client_id,
        subscriptions: topics,
    };
    client
        .executor()
        .execute_unit(Method::POST, REALTIME_PATH, &RequestOptions::default(), Some(&body))
        .await
}

/// State owned by the background task.
struct StreamWorker {
    client: PocketLinkClient,
    registry: SubscriptionRegistry,
    handlers: RealtimeHandlers,
    cancel: CancellationToken,
    signal: watch::Sender<SessionSignal>,
    push_lock: Arc<AsyncMutex<()>>,
    events: mpsc::Sender<RealtimeEvent>,
    backoff: Backoff,
}

impl StreamWorker {
    async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let err = match self.stream_once().await {
                Ok(()) => PocketLinkError::Disconnected,
                Err(e) => e,
            };
            // drop liveness before the id so connect() never sees a live
            // session without one
            self.signal
                .send_if_modified(|s| std::mem::replace(&mut s.live, false));
            if self.registry.clear_client_id() {
                self.handlers
                    .emit_disconnect(DisconnectReason::new(err.to_string()));
            }

            if self.cancel.is_cancelled()
                || matches!(
                    err,
                    PocketLinkError::Cancelled | PocketLinkError::EventReceiverDropped
                )
            {
                log::debug!("[PB_REALTIME] Worker stopping: {}", err);
                break;
            }

            match classify(&err) {
                ErrorClass::Transient => {
                    let delay = self.backoff.next_delay();
                    log::info!(
                        "[PB_REALTIME] Disconnected ({}); reconnecting in {}ms",
                        err,
                        delay.as_millis()
                    );
                    self.handlers
                        .emit_error(ConnectionError::new(err.to_string(), true));
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {},
                    }
                },
                ErrorClass::Fatal => {
                    log::warn!("[PB_REALTIME] Fatal stream error, giving up: {}", err);
                    self.handlers
                        .emit_error(ConnectionError::new(err.to_string(), false));
                    // best effort: cancellation or a dropped receiver skips it
                    let _ = self.deliver(RealtimeEvent::terminal(&err)).await;
                    break;
                },
            }
        }
        self.signal.send_modify(|s| {
            s.live = false;
            s.stopped = true;
        });
    }

    /// One connection: open, read until the stream ends.
    ///
    /// `Ok(())` means a clean end of stream.
    async fn stream_once(&mut self) -> Result<()> {
        let response = self.client.executor().open_event_stream(REALTIME_PATH).await?;
        let mut body = std::pin::pin!(response.bytes_stream());
        let mut decoder = SseDecoder::new();
        let mut session_captured = false;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PocketLinkError::Cancelled),
                chunk = body.next() => chunk,
            };
            let bytes = match chunk {
                Some(bytes) => bytes?,
                None => {
                    if decoder.has_partial() {
                        log::debug!("[PB_REALTIME] Discarding unterminated trailing record");
                    }
                    return Ok(());
                },
            };
            for record in decoder.feed(&bytes) {
                self.handle_record(record, &mut session_captured).await?;
            }
        }
    }

    async fn handle_record(&mut self, record: SseRecord, session_captured: &mut bool) -> Result<()> {
        if !*session_captured && record.name == CONNECT_EVENT {
            let client_id = serde_json::from_slice::<ConnectPayload>(&record.data)
                .map(|payload| payload.client_id)
                .unwrap_or_default();
            if !client_id.is_empty() {
                *session_captured = true;
                self.on_session(&client_id).await;
            }
        }
        self.deliver(RealtimeEvent {
            name: record.name,
            data: record.data,
        })
        .await
    }

    async fn on_session(&mut self, client_id: &str) {
        self.registry.set_client_id(client_id);
        self.backoff.reset();
        self.signal.send_modify(|s| {
            s.established += 1;
            s.live = true;
        });
        log::info!("[PB_REALTIME] Session established: client_id={}", client_id);
        self.handlers.emit_connect(client_id);

        let _push = self.push_lock.lock().await;
        let topics = self.registry.current();
        if let Err(e) = push_subscriptions(&self.client, client_id, &topics).await {
            log::warn!("[PB_REALTIME] Failed to push subscriptions: {}", e);
            self.handlers.emit_error(ConnectionError::new(
                format!("Failed to push subscriptions: {}", e),
                true,
            ));
        }
    }

    /// Hand an event to the consumer, waiting for capacity.
    async fn deliver(&self, event: RealtimeEvent) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PocketLinkError::Cancelled),
            sent = self.events.send(event) => {
                sent.map_err(|_| PocketLinkError::EventReceiverDropped)
            },
        }
    }
}
