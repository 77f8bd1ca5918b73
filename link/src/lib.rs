//! # pocket-link
//!
//! Async client for PocketBase-style backends: JSON requests over HTTP with
//! retries for idempotent reads, password auth flows, typed collection
//! helpers, batches and a self-healing realtime event stream.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pocket_link::{PocketLinkClient, RequestOptions};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Post {
//!     id: String,
//!     title: String,
//! }
//!
//! # async fn example() -> pocket_link::Result<()> {
//! let client = PocketLinkClient::builder()
//!     .base_url("http://127.0.0.1:8090")
//!     .build()?;
//! client.wait_ready(std::time::Duration::ZERO).await?;
//! client.login_superuser("admin@example.com", "secret").await?;
//!
//! let posts = client
//!     .collection::<Post>("posts")
//!     .list(&RequestOptions::query("sort=-created"))
//!     .await?;
//! println!("{} posts", posts.total_items);
//!
//! let (realtime, mut events) = client.realtime();
//! realtime.subscribe(["posts/*"]).await?;
//! realtime.connect().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backoff;
pub mod batch;
pub mod classify;
pub mod client;
pub mod collections;
pub mod config;
pub mod default_client;
pub mod error;
pub mod realtime;
pub mod request;
pub mod timeouts;

pub use auth::{AuthResponse, TokenStore, DEFAULT_USER_COLLECTION, SUPERUSERS_COLLECTION};
pub use backoff::Backoff;
pub use batch::{Batch, BatchCollection, BatchRequest, BatchResponse};
pub use classify::{classify, is_transient, ErrorClass};
pub use client::{HealthResponse, PocketLinkClient, PocketLinkClientBuilder};
pub use collections::{Collection, ListResult};
pub use config::{ClientConfig, Credentials, DEFAULT_BASE_URL};
pub use default_client::{default_client, init_default, teardown_default};
pub use error::{ApiError, PocketLinkError, Result};
pub use realtime::{
    ConnectionError, DisconnectReason, EventReceiver, RealtimeConnection, RealtimeEvent,
    RealtimeHandlers,
};
pub use request::{RequestExecutor, RequestOptions};
pub use reqwest::Method;
pub use timeouts::{PocketLinkTimeouts, PocketLinkTimeoutsBuilder, RetryPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
