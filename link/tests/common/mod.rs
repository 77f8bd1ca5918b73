#![allow(dead_code)]
//! In-process HTTP backend for integration tests.
//!
//! Serves one request per TCP connection (`Connection: close`), records every
//! request, and answers through a handler closure with either a JSON body or
//! an event stream.

use pocket_link::{PocketLinkClient, PocketLinkTimeouts, RetryPolicy};
use serde_json::Value;
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

static INIT_LOGGER: Once = Once::new();

/// Route crate logs through the test harness (`RUST_LOG=debug` to see them).
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// A request as received by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub received_at: Instant,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn is(&self, method: &str, path: &str) -> bool {
        self.method == method && self.path() == path
    }
}

/// What the mock answers with.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A complete response with a JSON (or raw) body.
    Body { status: u16, body: String },
    /// `200 text/event-stream`, written chunk by chunk. With `hold_open` the
    /// connection stays open after the last chunk until the server stops.
    Stream { chunks: Vec<String>, hold_open: bool },
    /// Read the request, then close the connection without answering.
    Hangup,
}

impl MockResponse {
    pub fn json(status: u16, value: Value) -> Self {
        Self::Body {
            status,
            body: value.to_string(),
        }
    }

    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        Self::Body {
            status,
            body: body.into(),
        }
    }

    pub fn no_content() -> Self {
        Self::raw(204, "")
    }

    /// Event stream that ends after `chunks`.
    pub fn stream<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self::Stream {
            chunks: chunks.into_iter().map(Into::into).collect(),
            hold_open: false,
        }
    }

    /// Event stream that stays open after `chunks`.
    pub fn stream_open<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self::Stream {
            chunks: chunks.into_iter().map(Into::into).collect(),
            hold_open: true,
        }
    }
}

/// One `event:`/`data:` record, blank-line terminated.
pub fn sse_record(name: &str, data: &str) -> String {
    format!("event: {}\ndata: {}\n\n", name, data)
}

pub fn connect_record(client_id: &str) -> String {
    sse_record("PB_CONNECT", &format!(r#"{{"clientId":"{}"}}"#, client_id))
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;

pub struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: CancellationToken,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        init_logger();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();
        let handler: Handler = Arc::new(handler);

        let accept_requests = requests.clone();
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let socket = tokio::select! {
                    _ = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((socket, _)) => socket,
                        Err(_) => continue,
                    },
                };
                tokio::spawn(serve_connection(
                    socket,
                    handler.clone(),
                    accept_requests.clone(),
                    accept_shutdown.clone(),
                ));
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            shutdown,
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Client pointed at this server with short, test-friendly timeouts.
    pub fn client(&self) -> PocketLinkClient {
        self.client_with(test_timeouts(), RetryPolicy::default())
    }

    pub fn client_with(&self, timeouts: PocketLinkTimeouts, retry: RetryPolicy) -> PocketLinkClient {
        PocketLinkClient::builder()
            .base_url(self.url())
            .timeouts(timeouts)
            .retry_policy(retry)
            .build()
            .expect("build client")
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|req| req.is(method, path))
            .collect()
    }

    /// Poll until `method path` has been hit `count` times.
    pub async fn wait_for_requests(
        &self,
        method: &str,
        path: &str,
        count: usize,
        within: Duration,
    ) -> Vec<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let matching = self.requests_to(method, path);
            if matching.len() >= count || tokio::time::Instant::now() >= deadline {
                return matching;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn test_timeouts() -> PocketLinkTimeouts {
    PocketLinkTimeouts::builder()
        .request_timeout(Duration::from_secs(5))
        .connection_timeout(Duration::from_secs(2))
        .realtime_connect_timeout(Duration::from_secs(3))
        .ready_timeout(Duration::from_secs(3))
        .build()
}

/// URL of a local port nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind scratch listener");
    let addr = listener.local_addr().expect("scratch address");
    drop(listener);
    format!("http://{}", addr)
}

async fn serve_connection(
    socket: TcpStream,
    handler: Handler,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: CancellationToken,
) {
    let mut reader = BufReader::new(socket);
    let request = match read_request(&mut reader).await {
        Some(request) => request,
        None => return,
    };
    requests
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(request.clone());

    let response = handler(&request);
    let mut socket = reader.into_inner();
    match response {
        MockResponse::Hangup => {},
        MockResponse::Body { status, body } => {
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                reason(status),
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
        },
        MockResponse::Stream { chunks, hold_open } => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for chunk in chunks {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            if hold_open {
                shutdown.cancelled().await;
            }
        },
    }
    let _ = socket.shutdown().await;
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> Option<RecordedRequest> {
    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await.ok()? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let (name, value) = (name.trim().to_string(), value.trim().to_string());
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
            headers.push((name, value));
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.ok()?;
    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
        received_at: Instant::now(),
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
