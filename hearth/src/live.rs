//! Live views: derived read models over one or more feeds.
//!
//! A [`Projector`] collects feeds, then [`Projector::activate`] spawns one task that merges them
//! and recomputes the view from the latest emission of every feed each time any of them emits.
//! Feeds that have not emitted yet are simply absent from the [`Slots`] the combining function
//! sees. The resulting [`LiveView`] owns the whole subscription: releasing or dropping it tears
//! every feed down together.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::{
    sync::watch,
    task::AbortHandle,
};

use crate::store::{DocSnapshot, Feed};

/// One emission of any feed kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Document(Option<DocSnapshot>),
    Results(Vec<DocSnapshot>),
    Value(Option<Value>),
}

impl From<Option<DocSnapshot>> for Emission {
    fn from(snapshot: Option<DocSnapshot>) -> Self {
        Emission::Document(snapshot)
    }
}

impl From<Vec<DocSnapshot>> for Emission {
    fn from(results: Vec<DocSnapshot>) -> Self {
        Emission::Results(results)
    }
}

impl From<Option<Value>> for Emission {
    fn from(value: Option<Value>) -> Self {
        Emission::Value(value)
    }
}

/// Latest emission per feed, indexed in the order the feeds were added.
#[derive(Debug, Clone, Default)]
pub struct Slots {
    latest: Vec<Option<Emission>>,
}

impl Slots {
    fn new(len: usize) -> Self {
        Self { latest: vec![None; len] }
    }

    fn store(&mut self, index: usize, emission: Emission) {
        if let Some(slot) = self.latest.get_mut(index) {
            *slot = Some(emission);
        }
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn has_emitted(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Raw emission, `None` until feed `index` has emitted.
    pub fn get(&self, index: usize) -> Option<&Emission> {
        self.latest.get(index).and_then(Option::as_ref)
    }

    /// Document of a document feed; `None` if it has not emitted or the document is absent.
    pub fn document(&self, index: usize) -> Option<&DocSnapshot> {
        match self.get(index) {
            Some(Emission::Document(snapshot)) => snapshot.as_ref(),
            _ => None,
        }
    }

    /// Result set of a query feed; empty until it has emitted.
    pub fn results(&self, index: usize) -> &[DocSnapshot] {
        match self.get(index) {
            Some(Emission::Results(results)) => results,
            _ => &[],
        }
    }

    /// Value of a realtime feed; `None` if it has not emitted or the node is absent.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.get(index) {
            Some(Emission::Value(value)) => value.as_ref(),
            _ => None,
        }
    }

    /// Decodes the document of feed `index`. Undecodable documents are logged and skipped.
    pub fn decode_document<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        let snapshot = self.document(index)?;
        match snapshot.decode() {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                log::warn!("live view: skipping undecodable document {}: {err}", snapshot.id);
                None
            }
        }
    }

    /// Decodes every document of query feed `index`, skipping the ones that do not decode.
    pub fn decode_results<T: DeserializeOwned>(&self, index: usize) -> Vec<T> {
        self.results(index)
            .iter()
            .filter_map(|snapshot| match snapshot.decode() {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    log::warn!("live view: skipping undecodable document {}: {err}", snapshot.id);
                    None
                }
            })
            .collect()
    }

    pub fn decode_value<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        let value = self.value(index)?;
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                log::warn!("live view: skipping undecodable value: {err}");
                None
            }
        }
    }
}

/// Collects the feeds a view is derived from.
#[derive(Default)]
pub struct Projector {
    feeds: Vec<BoxStream<'static, Emission>>,
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feed; its emissions land in the slot with the next index.
    pub fn feed<T>(mut self, feed: Feed<T>) -> Self
    where
        T: Into<Emission> + Send + 'static,
    {
        self.feeds.push(feed.into_stream().map(Into::into).boxed());
        self
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Starts projecting. Must be called from within a tokio runtime.
    ///
    /// `combine` runs on the projector task after every emission.
    pub fn activate<V, F>(self, mut combine: F) -> LiveView<V>
    where
        V: Send + Sync + 'static,
        F: FnMut(&Slots) -> V + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let gate = Arc::new(Mutex::new(Gate::default()));
        let mut slots = Slots::new(self.feeds.len());
        let mut merged = stream::select_all(
            self.feeds
                .into_iter()
                .enumerate()
                .map(|(index, feed)| feed.map(move |emission| (index, emission)).boxed()),
        );

        let task_gate = Arc::clone(&gate);
        let task = tokio::spawn(async move {
            while let Some((index, emission)) = merged.next().await {
                slots.store(index, emission);
                let view = combine(&slots);
                // Publishing under the gate means release() never returns while a publish is
                // half done, and nothing is published once it has returned.
                let gate = task_gate.lock().unwrap_or_else(PoisonError::into_inner);
                if gate.released {
                    break;
                }
                tx.send_replace(Some(view));
            }
            log::debug!("live view: all feeds ended");
        });

        LiveView {
            rx,
            subscription: Subscription {
                gate,
                task: task.abort_handle(),
            },
        }
    }
}

#[derive(Default)]
struct Gate {
    released: bool,
}

/// Ownership of a running projection.
///
/// Released exactly once: by [`Subscription::release`] or on drop, whichever comes first.
pub struct Subscription {
    gate: Arc<Mutex<Gate>>,
    task: AbortHandle,
}

impl Subscription {
    /// Stops the projection and tears down its feeds. Idempotent.
    pub fn release(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.released {
            return;
        }
        gate.released = true;
        self.task.abort();
        log::debug!("live view: released");
    }

    pub fn is_released(&self) -> bool {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner).released
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.is_released())
            .finish()
    }
}

/// A derived view kept current by its projector task.
///
/// Holds `None` until the first emission of any feed.
pub struct LiveView<V> {
    rx: watch::Receiver<Option<V>>,
    subscription: Subscription,
}

impl<V> LiveView<V> {
    pub fn borrow(&self) -> watch::Ref<'_, Option<V>> {
        self.rx.borrow()
    }

    pub fn current(&self) -> Option<V>
    where
        V: Clone,
    {
        self.rx.borrow().clone()
    }

    /// Waits for the next publish; `false` once the view is released or every feed ended.
    pub async fn changed(&mut self) -> bool {
        if self.subscription.is_released() {
            return false;
        }
        self.rx.changed().await.is_ok()
    }

    /// Waits for the next publish and returns it.
    pub async fn next(&mut self) -> Option<V>
    where
        V: Clone,
    {
        if !self.changed().await {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }

    /// Waits until the published view satisfies `predicate`, checking the current one first.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&V) -> bool) -> Option<V>
    where
        V: Clone,
    {
        if self.subscription.is_released() {
            return None;
        }
        let view = self
            .rx
            .wait_for(|view| view.as_ref().is_some_and(&mut predicate))
            .await
            .ok()?;
        (*view).clone()
    }

    pub fn release(&self) {
        self.subscription.release();
    }

    pub fn is_released(&self) -> bool {
        self.subscription.is_released()
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<V: fmt::Debug> fmt::Debug for LiveView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveView")
            .field("current", &*self.rx.borrow())
            .field("released", &self.subscription.is_released())
            .finish()
    }
}
