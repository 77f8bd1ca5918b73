//! Typed CRUD helpers for record collections.

use crate::{
    auth::escape_segment,
    client::PocketLinkClient,
    error::{PocketLinkError, Result},
    request::{RequestOptions, NO_BODY},
};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total_items: i64,
    #[serde(default)]
    pub total_pages: i64,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Records of one collection, decoded as `T`.
///
/// ```rust,no_run
/// use pocket_link::{PocketLinkClient, RequestOptions};
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Post {
///     title: String,
/// }
///
/// # async fn example(client: PocketLinkClient) -> pocket_link::Result<()> {
/// let posts = client.collection::<Post>("posts");
/// let page = posts.list(&RequestOptions::query("sort=-created")).await?;
/// for post in page.items {
///     println!("{}", post.title);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Collection<T> {
    client: PocketLinkClient,
    name: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            name: self.name.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Collection<T> {
    pub(crate) fn new(client: PocketLinkClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn records_path(&self) -> String {
        format!("/api/collections/{}/records", escape_segment(&self.name))
    }

    fn record_path(&self, id: &str) -> String {
        format!("{}/{}", self.records_path(), escape_segment(id))
    }

    /// Insert a record.
    pub async fn create<B: Serialize + ?Sized>(
        &self,
        record: &B,
        options: &RequestOptions,
    ) -> Result<T> {
        self.client
            .executor()
            .execute(Method::POST, &self.records_path(), options, Some(record))
            .await
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: &str, options: &RequestOptions) -> Result<T> {
        self.client
            .executor()
            .execute(Method::GET, &self.record_path(id), options, NO_BODY)
            .await
    }

    /// Patch a record by id.
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        id: &str,
        patch: &B,
        options: &RequestOptions,
    ) -> Result<T> {
        self.client
            .executor()
            .execute(Method::PATCH, &self.record_path(id), options, Some(patch))
            .await
    }

    /// Delete a record by id.
    pub async fn delete(&self, id: &str, options: &RequestOptions) -> Result<()> {
        self.client
            .executor()
            .execute_unit(Method::DELETE, &self.record_path(id), options, NO_BODY)
            .await
    }

    /// Fetch one page of records.
    pub async fn list(&self, options: &RequestOptions) -> Result<ListResult<T>> {
        self.client
            .executor()
            .execute(Method::GET, &self.records_path(), options, NO_BODY)
            .await
    }

    /// First record matching the query, or [`PocketLinkError::NotFound`].
    pub async fn first(&self, options: &RequestOptions) -> Result<T> {
        let options = RequestOptions::query(first_page_query(options.raw_query()));
        let page = self.list(&options).await?;
        page.items.into_iter().next().ok_or_else(|| {
            PocketLinkError::NotFound(format!("no record in collection '{}'", self.name))
        })
    }
}

fn first_page_query(query: Option<&str>) -> String {
    match query {
        Some(query) => format!("{}&page=1&perPage=1", query),
        None => "page=1&perPage=1".to_string(),
    }
}
