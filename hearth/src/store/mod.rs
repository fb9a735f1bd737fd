//! Document store seam.
//!
//! [`DocumentStore`] is the contract the rest of the crate relies on: point reads and writes,
//! a version-checked write ([`DocumentStore::compare_and_set`]) that the transaction runner
//! builds on, collection queries, and live feeds of a document or of a query result set.
//!
//! Two backends are provided: [`MemoryStore`] (in-process) and [`RedisStore`].

mod memory;
mod redis_store;

use std::fmt;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{sync::mpsc, task::AbortHandle};

use crate::{errors::StoreError, query::Query, types::Document};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Address of one document: `collection/id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as read at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSnapshot {
    pub id: String,
    /// Bumped by every write; starts at 1 when the document is created.
    pub version: u64,
    pub data: Value,
}

impl DocSnapshot {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Result of a version-checked write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Written { version: u64 },
    /// The document changed since it was read; nothing was written.
    Stale { actual: u64 },
}

/// A live feed of snapshots.
///
/// Emits the current state as soon as it is established, then once per relevant change, in
/// order. Dropping (or [`Feed::close`]-ing) the feed stops delivery and any background task
/// pumping it.
pub struct Feed<T> {
    rx: mpsc::UnboundedReceiver<T>,
    pump: Option<AbortHandle>,
}

impl<T> Feed<T> {
    pub fn from_receiver(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx, pump: None }
    }

    /// A feed fed by a background task that is aborted when the feed goes away.
    pub fn with_pump(rx: mpsc::UnboundedReceiver<T>, pump: AbortHandle) -> Self {
        Self { rx, pump: Some(pump) }
    }

    /// Next emission, or `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next already-delivered emission, without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.rx.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, T>
    where
        T: Send + 'static,
    {
        stream::unfold(self, |mut feed| async move { feed.next().await.map(|item| (item, feed)) }).boxed()
    }
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl<T> fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed").field("pumped", &self.pump.is_some()).finish()
    }
}

#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError>;

    /// Creates the document; fails with [`StoreError::AlreadyExists`] if it is present.
    async fn create(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError>;

    /// Creates or overwrites the document.
    async fn set(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError>;

    /// Overwrites the document only if it is still at `expected_version`.
    ///
    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn compare_and_set(&self, doc: &DocRef, expected_version: u64, data: Value)
    -> Result<CasOutcome, StoreError>;

    /// Removes the document; returns whether it existed.
    async fn delete(&self, doc: &DocRef) -> Result<bool, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<DocSnapshot>, StoreError>;

    /// Live feed of one document (`None` while it does not exist).
    async fn watch_document(&self, doc: &DocRef) -> Result<Feed<Option<DocSnapshot>>, StoreError>;

    /// Live feed of a query's result set.
    async fn watch_query(&self, query: &Query) -> Result<Feed<Vec<DocSnapshot>>, StoreError>;
}

/// Typed helpers over any [`DocumentStore`].
#[allow(async_fn_in_trait)]
pub trait DocumentStoreExt: DocumentStore {
    async fn get_document<T: Document>(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.get(&T::reference(id)).await? {
            Some(snapshot) => Ok(Some(snapshot.decode()?)),
            None => Ok(None),
        }
    }

    async fn require_document<T: Document>(&self, id: &str) -> Result<T, StoreError> {
        self.get_document::<T>(id)
            .await?
            .ok_or_else(|| StoreError::not_found(T::reference(id).path()))
    }

    async fn put_document<T: Document>(&self, document: &T) -> Result<u64, StoreError> {
        self.set(&document.doc_ref(), encode(document)?).await
    }

    async fn create_document<T: Document>(&self, document: &T) -> Result<u64, StoreError> {
        self.create(&document.doc_ref(), encode(document)?).await
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Encodes a value that must serialize to a JSON object.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    let encoded = serde_json::to_value(value)?;
    if !encoded.is_object() {
        return Err(StoreError::invalid("documents must serialize to JSON objects"));
    }
    Ok(encoded)
}
