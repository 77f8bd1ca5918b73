//! Realtime event stream: one background worker per connection, reconnecting
//! with backoff and re-pushing the subscription set after every new session.

pub mod connection;
pub mod event;
pub mod handlers;
pub mod registry;
pub mod sse;

pub use connection::{RealtimeConnection, REALTIME_PATH};
pub use event::{EventReceiver, RealtimeEvent, CONNECT_EVENT, ERROR_EVENT, EVENT_CHANNEL_CAPACITY};
pub use handlers::{ConnectionError, DisconnectReason, RealtimeHandlers};
pub use registry::SubscriptionRegistry;
pub use sse::{SseDecoder, SseRecord};
