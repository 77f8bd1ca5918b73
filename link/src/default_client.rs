//! Opt-in process-wide client registry.
//!
//! Nothing in the crate reads this registry implicitly; it only holds a client
//! between an explicit [`init_default`] and [`teardown_default`].

use crate::{
    client::PocketLinkClient,
    error::{PocketLinkError, Result},
};
use std::sync::{PoisonError, RwLock};

static DEFAULT_CLIENT: RwLock<Option<PocketLinkClient>> = RwLock::new(None);

/// Register `client` as the default, returning the previous one.
pub fn init_default(client: PocketLinkClient) -> Option<PocketLinkClient> {
    DEFAULT_CLIENT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(client)
}

/// A handle to the registered default client.
pub fn default_client() -> Result<PocketLinkClient> {
    DEFAULT_CLIENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or_else(|| {
            PocketLinkError::Configuration(
                "default client not initialized; call init_default first".to_string(),
            )
        })
}

/// Remove the default client. Existing handles keep working.
pub fn teardown_default() -> Option<PocketLinkClient> {
    DEFAULT_CLIENT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}
