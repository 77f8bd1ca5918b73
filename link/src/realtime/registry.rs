//! Desired topics and the live session id, behind one reader/writer lock.
//!
//! The lock is only held to copy or replace fields; no I/O happens under it.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct SessionState {
    client_id: String,
    subscriptions: Vec<String>,
}

/// Shared subscription set plus session id.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    state: Arc<RwLock<SessionState>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the desired topics.
    ///
    /// Returns the live session id observed atomically with the update, so the
    /// caller knows whether the new set must be pushed now.
    pub fn set(&self, topics: Vec<String>) -> Option<String> {
        let mut state = self.write();
        state.subscriptions = topics;
        (!state.client_id.is_empty()).then(|| state.client_id.clone())
    }

    /// Snapshot of the desired topics, in the order given.
    pub fn current(&self) -> Vec<String> {
        self.read().subscriptions.clone()
    }

    /// The live session id, if a session is established.
    pub fn client_id(&self) -> Option<String> {
        let state = self.read();
        (!state.client_id.is_empty()).then(|| state.client_id.clone())
    }

    pub(crate) fn set_client_id(&self, client_id: &str) {
        self.write().client_id = client_id.to_string();
    }

    /// Forget the session id; returns whether one was live.
    pub(crate) fn clear_client_id(&self) -> bool {
        let mut state = self.write();
        let was_live = !state.client_id.is_empty();
        state.client_id.clear();
        was_live
    }
}
