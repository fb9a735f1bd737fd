use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde_json::Value;
use tokio::sync::mpsc;

use super::{CasOutcome, DocRef, DocSnapshot, DocumentStore, Feed};
use crate::{errors::StoreError, query::Query};

/// In-process document store.
///
/// Cloning yields another handle on the same data, the way several UI surfaces share one SDK
/// client. Feeds are notified synchronously while the write still holds the lock, so every feed
/// observes writes in the order they were applied.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, StoredDocument>>,
    watchers: Vec<Watcher>,
}

struct StoredDocument {
    version: u64,
    data: Value,
}

enum Watcher {
    Document {
        doc: DocRef,
        tx: mpsc::UnboundedSender<Option<DocSnapshot>>,
    },
    Query {
        query: Query,
        tx: mpsc::UnboundedSender<Vec<DocSnapshot>>,
    },
}

impl Watcher {
    fn is_closed(&self) -> bool {
        match self {
            Watcher::Document { tx, .. } => tx.is_closed(),
            Watcher::Query { tx, .. } => tx.is_closed(),
        }
    }

    fn collection(&self) -> &str {
        match self {
            Watcher::Document { doc, .. } => &doc.collection,
            Watcher::Query { query, .. } => &query.collection,
        }
    }
}

impl MemoryState {
    fn snapshot(&self, doc: &DocRef) -> Option<DocSnapshot> {
        self.collections
            .get(&doc.collection)
            .and_then(|documents| documents.get(&doc.id))
            .map(|stored| DocSnapshot {
                id: doc.id.clone(),
                version: stored.version,
                data: stored.data.clone(),
            })
    }

    fn run_query(&self, query: &Query) -> Vec<DocSnapshot> {
        let Some(documents) = self.collections.get(&query.collection) else {
            return Vec::new();
        };
        query.apply(documents.iter().map(|(id, stored)| DocSnapshot {
            id: id.clone(),
            version: stored.version,
            data: stored.data.clone(),
        }))
    }

    fn write(&mut self, doc: &DocRef, data: Value) -> u64 {
        let documents = self.collections.entry(doc.collection.clone()).or_default();
        let version = documents.get(&doc.id).map(|stored| stored.version + 1).unwrap_or(1);
        documents.insert(doc.id.clone(), StoredDocument { version, data });
        self.notify(&doc.collection);
        version
    }

    fn notify(&mut self, collection: &str) {
        self.watchers.retain(|watcher| !watcher.is_closed());
        for watcher in &self.watchers {
            if watcher.collection() != collection {
                continue;
            }
            // A send only fails when the receiver went away; the next notify prunes it.
            match watcher {
                Watcher::Document { doc, tx } => {
                    let _ = tx.send(self.snapshot(doc));
                }
                Watcher::Query { query, tx } => {
                    let _ = tx.send(self.run_query(query));
                }
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of feeds that are still open.
    pub fn live_feed_count(&self) -> usize {
        let mut state = self.state();
        state.watchers.retain(|watcher| !watcher.is_closed());
        state.watchers.len()
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError> {
        Ok(self.state().snapshot(doc))
    }

    async fn create(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError> {
        let mut state = self.state();
        if state.snapshot(doc).is_some() {
            return Err(StoreError::AlreadyExists { path: doc.path() });
        }
        Ok(state.write(doc, data))
    }

    async fn set(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError> {
        Ok(self.state().write(doc, data))
    }

    async fn compare_and_set(
        &self,
        doc: &DocRef,
        expected_version: u64,
        data: Value,
    ) -> Result<CasOutcome, StoreError> {
        let mut state = self.state();
        let Some(current) = state.snapshot(doc) else {
            return Err(StoreError::not_found(doc.path()));
        };
        if current.version != expected_version {
            return Ok(CasOutcome::Stale {
                actual: current.version,
            });
        }
        let version = state.write(doc, data);
        Ok(CasOutcome::Written { version })
    }

    async fn delete(&self, doc: &DocRef) -> Result<bool, StoreError> {
        let mut state = self.state();
        let removed = state
            .collections
            .get_mut(&doc.collection)
            .and_then(|documents| documents.remove(&doc.id))
            .is_some();
        if removed {
            state.notify(&doc.collection);
        }
        Ok(removed)
    }

    async fn query(&self, query: &Query) -> Result<Vec<DocSnapshot>, StoreError> {
        Ok(self.state().run_query(query))
    }

    async fn watch_document(&self, doc: &DocRef) -> Result<Feed<Option<DocSnapshot>>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        let _ = tx.send(state.snapshot(doc));
        state.watchers.push(Watcher::Document { doc: doc.clone(), tx });
        log::debug!("memory store: watching document {doc}");
        Ok(Feed::from_receiver(rx))
    }

    async fn watch_query(&self, query: &Query) -> Result<Feed<Vec<DocSnapshot>>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        let _ = tx.send(state.run_query(query));
        state.watchers.push(Watcher::Query {
            query: query.clone(),
            tx,
        });
        log::debug!("memory store: watching query on {}", query.collection);
        Ok(Feed::from_receiver(rx))
    }
}
