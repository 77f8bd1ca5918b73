//! Batched record operations sent through `/api/batch`.
//!
//! Every queued sub-request runs under the auth context of the outer batch
//! request; per-request authorization is not supported by the backend.

use crate::{
    auth::escape_segment,
    client::PocketLinkClient,
    error::Result,
    request::RequestOptions,
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One queued sub-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    requests: &'a [BatchRequest],
}

/// One sub-response of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status: u16,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Accumulates requests sent in a single `/api/batch` call.
pub struct Batch {
    client: PocketLinkClient,
    requests: Vec<BatchRequest>,
}

impl Batch {
    pub(crate) fn new(client: PocketLinkClient) -> Self {
        Self {
            client,
            requests: Vec::new(),
        }
    }

    /// Queued requests, in order.
    pub fn requests(&self) -> &[BatchRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Drop all queued requests.
    pub fn reset(&mut self) {
        self.requests.clear();
    }

    /// Helpers that enqueue requests against collection `name`.
    pub fn collection(&mut self, name: &str) -> BatchCollection<'_> {
        BatchCollection {
            batch: self,
            name: escape_segment(name),
        }
    }

    /// Enqueue an arbitrary request.
    pub fn raw(&mut self, method: Method, url: impl Into<String>, body: Option<serde_json::Value>) {
        self.requests.push(BatchRequest {
            method: method.to_string(),
            url: url.into(),
            headers: HashMap::new(),
            body,
        });
    }

    fn add(
        &mut self,
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
        options: &RequestOptions,
    ) {
        let url = match options.raw_query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        };
        self.raw(method, url, body);
    }

    /// Post every queued request and return the sub-responses.
    pub async fn send(&self, options: &RequestOptions) -> Result<Vec<BatchResponse>> {
        log::debug!("[PB_HTTP] Sending batch of {} request(s)", self.requests.len());
        let payload = BatchPayload {
            requests: &self.requests,
        };
        self.client
            .executor()
            .execute(Method::POST, "/api/batch", options, Some(&payload))
            .await
    }
}

/// Collection-scoped view of a [`Batch`].
pub struct BatchCollection<'a> {
    batch: &'a mut Batch,
    name: String,
}

impl BatchCollection<'_> {
    fn records_path(&self) -> String {
        format!("/api/collections/{}/records", self.name)
    }

    /// Enqueue a record create.
    pub fn create<B: Serialize>(&mut self, body: &B, options: &RequestOptions) -> Result<()> {
        let body = serde_json::to_value(body)?;
        let path = self.records_path();
        self.batch.add(Method::POST, path, Some(body), options);
        Ok(())
    }

    /// Enqueue a record update.
    pub fn update<B: Serialize>(
        &mut self,
        id: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<()> {
        let body = serde_json::to_value(body)?;
        let path = format!("{}/{}", self.records_path(), escape_segment(id));
        self.batch.add(Method::PATCH, path, Some(body), options);
        Ok(())
    }

    /// Enqueue an upsert (create, or update when the body carries an existing id).
    pub fn upsert<B: Serialize>(&mut self, body: &B, options: &RequestOptions) -> Result<()> {
        let body = serde_json::to_value(body)?;
        let path = self.records_path();
        self.batch.add(Method::PUT, path, Some(body), options);
        Ok(())
    }

    /// Enqueue a record delete.
    pub fn delete(&mut self, id: &str, options: &RequestOptions) {
        let path = format!("{}/{}", self.records_path(), escape_segment(id));
        self.batch.add(Method::DELETE, path, None, options);
    }
}
