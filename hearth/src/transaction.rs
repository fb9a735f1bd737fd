//! Optimistic read-modify-write over any [`DocumentStore`].
//!
//! [`run_transaction`] reads a document, hands its data to a closure, and writes the closure's
//! result back with [`DocumentStore::compare_and_set`]. If another writer got there first the
//! whole sequence is replayed against the fresh snapshot, up to
//! [`TransactionOptions::max_attempts`]. Transient backend failures are replayed within the same
//! budget. The closure may run several times and must not have side effects of its own.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::{
    errors::StoreError,
    store::{CasOutcome, DocRef, DocumentStore},
};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl TransactionOptions {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// What a transaction closure decided for one attempt.
#[derive(Debug)]
pub enum TxStep<T> {
    /// Write `data` (the whole document) and finish with `result` if the write lands.
    Write(Value, T),
    /// Nothing to write; finish with `result`.
    Skip(T),
}

pub async fn run_transaction<S, F, T>(
    store: &S,
    doc: &DocRef,
    options: &TransactionOptions,
    mut step: F,
) -> Result<T, StoreError>
where
    S: DocumentStore + ?Sized,
    F: FnMut(&Value) -> Result<TxStep<T>, StoreError>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match attempt_once(store, doc, &mut step).await {
            Ok(Some(result)) => return Ok(result),
            Ok(None) => {
                log::debug!("transaction on {doc}: conflicting write on attempt {attempt}/{max_attempts}");
                if attempt >= max_attempts {
                    return Err(StoreError::Conflict {
                        path: doc.path(),
                        attempts: attempt,
                    });
                }
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                log::debug!("transaction on {doc}: transient failure on attempt {attempt}/{max_attempts}: {err}");
            }
            Err(err) => return Err(err),
        }
        if !options.backoff.is_zero() {
            tokio::time::sleep(options.backoff * attempt).await;
        }
    }
}

/// One read-modify-write pass; `Ok(None)` means the write lost a race.
async fn attempt_once<S, F, T>(store: &S, doc: &DocRef, step: &mut F) -> Result<Option<T>, StoreError>
where
    S: DocumentStore + ?Sized,
    F: FnMut(&Value) -> Result<TxStep<T>, StoreError>,
{
    let snapshot = store.get(doc).await?.ok_or_else(|| StoreError::not_found(doc.path()))?;
    match step(&snapshot.data)? {
        TxStep::Skip(result) => Ok(Some(result)),
        TxStep::Write(data, result) => match store.compare_and_set(doc, snapshot.version, data).await? {
            CasOutcome::Written { .. } => Ok(Some(result)),
            CasOutcome::Stale { .. } => Ok(None),
        },
    }
}

/// Merges top-level `fields` into an existing document, leaving other fields untouched.
pub async fn merge_fields<S>(
    store: &S,
    doc: &DocRef,
    fields: Map<String, Value>,
    options: &TransactionOptions,
) -> Result<(), StoreError>
where
    S: DocumentStore + ?Sized,
{
    run_transaction(store, doc, options, |current| {
        let Value::Object(existing) = current else {
            return Err(StoreError::invalid(format!("{doc} is not a JSON object")));
        };
        let mut merged = existing.clone();
        for (key, value) in &fields {
            merged.insert(key.clone(), value.clone());
        }
        if &merged == existing {
            return Ok(TxStep::Skip(()));
        }
        Ok(TxStep::Write(Value::Object(merged), ()))
    })
    .await
}
