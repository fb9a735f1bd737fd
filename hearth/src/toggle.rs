//! Idempotent membership toggles on list fields.
//!
//! The list arithmetic is the pure function [`apply_toggle`]; [`ToggleListMutator`] wraps it in
//! a [`run_transaction`] so the new list is written only against the snapshot it was computed
//! from. Lists are sets keyed by an [`Identity`]: adding a key that is already present keeps the
//! existing entry where it is (snapshots are not refreshed), removing an absent key changes
//! nothing.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use serde_json::Value;
use tokio::sync::Notify;

use crate::{
    errors::StoreError,
    store::{DocRef, DocumentStore},
    transaction::{TransactionOptions, TxStep, run_transaction},
    types::Member,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    Present,
    Absent,
}

/// How the key of a stored list entry is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The entry is the key itself (`friends: ["u1", "u2"]`).
    Scalar,
    /// The entry is an object keyed by this field (`likes: [{"uid": "u1", ...}]`).
    Field(String),
}

impl Identity {
    pub fn of<M: Member>() -> Self {
        Identity::Field(M::KEY_FIELD.to_string())
    }

    pub fn key_of<'a>(&self, entry: &'a Value) -> Option<&'a str> {
        match self {
            Identity::Scalar => entry.as_str(),
            Identity::Field(field) => entry.get(field).and_then(Value::as_str),
        }
    }
}

/// Desired membership of one key.
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOp<T> {
    Add { key: String, entry: T },
    Remove { key: String },
}

impl<T> ToggleOp<T> {
    pub fn key(&self) -> &str {
        match self {
            ToggleOp::Add { key, .. } | ToggleOp::Remove { key } => key,
        }
    }

    pub fn membership(&self) -> Membership {
        match self {
            ToggleOp::Add { .. } => Membership::Present,
            ToggleOp::Remove { .. } => Membership::Absent,
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        ToggleOp::Remove { key: key.into() }
    }
}

impl ToggleOp<Value> {
    /// Toggle for a list of plain string keys.
    pub fn scalar(key: impl Into<String>, membership: Membership) -> Self {
        let key = key.into();
        match membership {
            Membership::Present => ToggleOp::Add {
                entry: Value::String(key.clone()),
                key,
            },
            Membership::Absent => ToggleOp::Remove { key },
        }
    }

    /// Adds `member`, stored as its JSON encoding.
    pub fn add_member<M: Member>(member: &M) -> Result<Self, StoreError> {
        Ok(ToggleOp::Add {
            key: member.member_key().to_string(),
            entry: serde_json::to_value(member)?,
        })
    }
}

/// New list value computed by [`apply_toggle`].
#[derive(Debug, Clone, PartialEq)]
pub struct ListChange<T> {
    pub list: Vec<T>,
    pub changed: bool,
}

/// Computes the list that results from applying `op` to `current`.
///
/// Entries for which `key_of` returns `None` are never matched and are kept as they are.
pub fn apply_toggle<T, K>(current: &[T], op: &ToggleOp<T>, key_of: K) -> ListChange<T>
where
    T: Clone,
    K: Fn(&T) -> Option<&str>,
{
    let key = op.key();
    match op {
        ToggleOp::Add { entry, .. } => {
            if current.iter().any(|existing| key_of(existing) == Some(key)) {
                return ListChange {
                    list: current.to_vec(),
                    changed: false,
                };
            }
            let mut list = current.to_vec();
            list.push(entry.clone());
            ListChange { list, changed: true }
        }
        ToggleOp::Remove { .. } => {
            let list: Vec<T> = current
                .iter()
                .filter(|existing| key_of(existing) != Some(key))
                .cloned()
                .collect();
            let changed = list.len() != current.len();
            ListChange { list, changed }
        }
    }
}

/// [`apply_toggle`] for typed members.
pub fn apply_member_toggle<M: Member + Clone>(current: &[M], op: &ToggleOp<M>) -> ListChange<M> {
    apply_toggle(current, op, |member| Some(member.member_key()))
}

/// Result of one toggle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The list was rewritten and now holds `len` entries.
    Applied { len: usize },
    /// The list already had the desired membership; nothing was written.
    Unchanged,
    /// The same toggle was already in flight from this mutator; the store was not touched.
    Coalesced,
}

impl ToggleOutcome {
    pub fn changed(self) -> bool {
        matches!(self, ToggleOutcome::Applied { .. })
    }
}

/// Applies membership toggles to list fields of documents in `S`.
///
/// A toggle whose `(document, field, key)` is already being applied by this mutator with the
/// same membership returns [`ToggleOutcome::Coalesced`] instead of racing the pending call. A
/// toggle in the opposite direction waits for the pending one to settle and then runs its own
/// transaction, so the last requested membership is the one that sticks.
pub struct ToggleListMutator<S> {
    store: S,
    options: TransactionOptions,
    in_flight: Mutex<HashMap<FlightKey, Membership>>,
    settled: Notify,
}

/// `(document, field, member key)` of a pending toggle.
type FlightKey = (DocRef, String, String);

struct InFlightGuard<'a> {
    flights: &'a Mutex<HashMap<FlightKey, Membership>>,
    settled: &'a Notify,
    key: FlightKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
        self.settled.notify_waiters();
    }
}

impl<S: DocumentStore> ToggleListMutator<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, TransactionOptions::default())
    }

    pub fn with_options(store: S, options: TransactionOptions) -> Self {
        Self {
            store,
            options,
            in_flight: Mutex::new(HashMap::new()),
            settled: Notify::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Brings the membership of `op.key()` in `doc.field` to the state `op` asks for.
    ///
    /// Fails with [`StoreError::NotFound`] if the document is absent, with
    /// [`StoreError::Conflict`] if concurrent writers won every attempt, and with
    /// [`StoreError::InvalidRequest`] if `field` holds something other than a list. A missing
    /// or null field counts as an empty list.
    pub async fn apply(
        &self,
        doc: &DocRef,
        field: &str,
        identity: &Identity,
        op: ToggleOp<Value>,
    ) -> Result<ToggleOutcome, StoreError> {
        let Some(_guard) = self.enter_flight(doc, field, &op).await else {
            log::debug!("toggle of {} in {doc}.{field} already in flight; coalescing", op.key());
            return Ok(ToggleOutcome::Coalesced);
        };

        run_transaction(&self.store, doc, &self.options, |current| {
            let list: &[Value] = match current.get(field) {
                None | Some(Value::Null) => &[],
                Some(Value::Array(items)) => items,
                Some(_) => return Err(StoreError::invalid(format!("{doc}.{field} is not a list"))),
            };
            let change = apply_toggle(list, &op, |entry| identity.key_of(entry));
            if !change.changed {
                return Ok(TxStep::Skip(ToggleOutcome::Unchanged));
            }

            let mut data = current.clone();
            let Value::Object(fields) = &mut data else {
                return Err(StoreError::invalid(format!("{doc} is not a JSON object")));
            };
            let len = change.list.len();
            fields.insert(field.to_string(), Value::Array(change.list));
            Ok(TxStep::Write(data, ToggleOutcome::Applied { len }))
        })
        .await
    }

    /// Registers `op` as pending, or returns `None` when an identical toggle already is.
    async fn enter_flight<T>(&self, doc: &DocRef, field: &str, op: &ToggleOp<T>) -> Option<InFlightGuard<'_>> {
        let key: FlightKey = (doc.clone(), field.to_string(), op.key().to_string());
        let membership = op.membership();
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            {
                let mut flights = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                match flights.get(&key).copied() {
                    None => {
                        flights.insert(key.clone(), membership);
                        return Some(InFlightGuard {
                            flights: &self.in_flight,
                            settled: &self.settled,
                            key,
                        });
                    }
                    Some(pending) if pending == membership => return None,
                    // Registered before the lock is released so the settling drop cannot be missed.
                    Some(_) => settled.as_mut().enable(),
                };
            }
            log::debug!("toggle of {} in {doc}.{field} waits for the opposite pending toggle", op.key());
            settled.await;
        }
    }

    pub async fn add_member<M: Member>(&self, doc: &DocRef, field: &str, member: &M) -> Result<ToggleOutcome, StoreError> {
        self.apply(doc, field, &Identity::of::<M>(), ToggleOp::add_member(member)?).await
    }

    pub async fn remove_member<M: Member>(&self, doc: &DocRef, field: &str, key: &str) -> Result<ToggleOutcome, StoreError> {
        self.apply(doc, field, &Identity::of::<M>(), ToggleOp::remove(key)).await
    }

    /// Toggles a plain string key in a list of strings.
    pub async fn set_scalar(
        &self,
        doc: &DocRef,
        field: &str,
        key: &str,
        membership: Membership,
    ) -> Result<ToggleOutcome, StoreError> {
        self.apply(doc, field, &Identity::Scalar, ToggleOp::scalar(key, membership)).await
    }
}
