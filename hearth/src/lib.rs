//! hearth core library.
//!
//! Client-side data logic for a small social network whose state lives in external services:
//! a document store, a realtime key-value store and an authentication service. The crate
//! provides the seams to those services ([`store::DocumentStore`], [`realtime::RealtimeStore`],
//! [`auth::AuthService`]), two backends for the document store (in-process and Redis), and the
//! two patterns the application is built from:
//!
//! - [`toggle::ToggleListMutator`]: idempotent add/remove of a member of a list field, run as an
//!   optimistic read-modify-write transaction.
//! - [`live::Projector`]: fan-in of live feeds into a derived view that is torn down as a unit.

extern crate self as hearth;

pub mod auth;
pub mod config;
pub mod errors;
pub mod id;
pub mod keys;
pub mod live;
pub mod model;
pub mod query;
pub mod realtime;
pub mod social;
pub mod store;
pub mod toggle;
pub mod transaction;
pub mod types;
pub mod validators;
pub mod views;

pub use errors::*;
pub use hearth_macros::{Document, Member};
pub use live::{Emission, LiveView, Projector, Slots, Subscription};
pub use query::{Filter, Query, SortOrder};
pub use store::{CasOutcome, DocRef, DocSnapshot, DocumentStore, DocumentStoreExt, Feed, MemoryStore, RedisStore};
pub use toggle::{Identity, Membership, ToggleListMutator, ToggleOp, ToggleOutcome};
pub use transaction::{TransactionOptions, TxStep, run_transaction};
pub use types::{Document, Member};

// Re-export redis so callers can build a connection without pinning their own version.
pub use redis;
pub use redis::aio::ConnectionManager;
