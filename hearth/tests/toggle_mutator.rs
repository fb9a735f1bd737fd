//! Toggle mutations against stores that lose races, fail transiently, or respond slowly.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use hearth::{
    CasOutcome, DocRef, DocSnapshot, DocumentStore, DocumentStoreExt, Feed, Identity, Member, MemoryStore, Query,
    StoreError, ToggleListMutator, ToggleOp, ToggleOutcome, TransactionOptions,
    model::{Like, Post, User, fields},
    types::Document,
};
use serde_json::{Value, json};

// ============================================================================
// Test stores
// ============================================================================

/// Delegates to a [`MemoryStore`] but lets a rival commit right before the first CAS.
struct RivalStore {
    inner: MemoryStore,
    rival_entry: Mutex<Option<Value>>,
    field: &'static str,
}

/// Every CAS loses; counts how many were attempted.
struct AlwaysStaleStore {
    inner: MemoryStore,
    attempts: AtomicU32,
}

/// The first `failures` reads fail with a dropped connection.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicU32,
}

/// Reads take `delay`, so toggles stay in flight long enough to overlap.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

macro_rules! delegate_store {
    ($store:ty) => {
        impl DocumentStore for $store {
            async fn get(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError> {
                self.read(doc).await
            }

            async fn create(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError> {
                self.inner.create(doc, data).await
            }

            async fn set(&self, doc: &DocRef, data: Value) -> Result<u64, StoreError> {
                self.inner.set(doc, data).await
            }

            async fn compare_and_set(
                &self,
                doc: &DocRef,
                expected_version: u64,
                data: Value,
            ) -> Result<CasOutcome, StoreError> {
                self.cas(doc, expected_version, data).await
            }

            async fn delete(&self, doc: &DocRef) -> Result<bool, StoreError> {
                self.inner.delete(doc).await
            }

            async fn query(&self, query: &Query) -> Result<Vec<DocSnapshot>, StoreError> {
                self.inner.query(query).await
            }

            async fn watch_document(&self, doc: &DocRef) -> Result<Feed<Option<DocSnapshot>>, StoreError> {
                self.inner.watch_document(doc).await
            }

            async fn watch_query(&self, query: &Query) -> Result<Feed<Vec<DocSnapshot>>, StoreError> {
                self.inner.watch_query(query).await
            }
        }
    };
}

impl RivalStore {
    async fn read(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError> {
        self.inner.get(doc).await
    }

    async fn cas(&self, doc: &DocRef, expected_version: u64, data: Value) -> Result<CasOutcome, StoreError> {
        let rival = self.rival_entry.lock().unwrap().take();
        if let Some(entry) = rival {
            // The rival read the same snapshot we did and commits first.
            let base = self.inner.get(doc).await?.expect("document exists");
            assert_eq!(base.version, expected_version);
            let mut rival_data = base.data.clone();
            rival_data[self.field].as_array_mut().expect("list field").push(entry);
            let outcome = self.inner.compare_and_set(doc, base.version, rival_data).await?;
            assert!(matches!(outcome, CasOutcome::Written { .. }));
        }
        self.inner.compare_and_set(doc, expected_version, data).await
    }
}

impl AlwaysStaleStore {
    async fn read(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError> {
        self.inner.get(doc).await
    }

    async fn cas(&self, _doc: &DocRef, expected_version: u64, _data: Value) -> Result<CasOutcome, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(CasOutcome::Stale {
            actual: expected_version + 1,
        })
    }
}

impl FlakyStore {
    async fn read(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            let dropped = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
            return Err(StoreError::Redis(dropped.into()));
        }
        self.inner.get(doc).await
    }

    async fn cas(&self, doc: &DocRef, expected_version: u64, data: Value) -> Result<CasOutcome, StoreError> {
        self.inner.compare_and_set(doc, expected_version, data).await
    }
}

impl SlowStore {
    async fn read(&self, doc: &DocRef) -> Result<Option<DocSnapshot>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(doc).await
    }

    async fn cas(&self, doc: &DocRef, expected_version: u64, data: Value) -> Result<CasOutcome, StoreError> {
        self.inner.compare_and_set(doc, expected_version, data).await
    }
}

delegate_store!(RivalStore);
delegate_store!(AlwaysStaleStore);
delegate_store!(FlakyStore);
delegate_store!(SlowStore);

// ============================================================================
// Helpers
// ============================================================================

fn fast_options(max_attempts: u32) -> TransactionOptions {
    TransactionOptions::new(max_attempts, Duration::ZERO)
}

async fn seed_post(store: &MemoryStore) -> Post {
    let author = User::new("author", "Author");
    let post = Post::new(author.summary(), "hello", Vec::new());
    store.create_document(&post).await.unwrap();
    post
}

fn likers(store_post: &Post) -> Vec<&str> {
    store_post.likes.iter().map(|like| like.uid.as_str()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn concurrent_likes_from_the_same_snapshot_both_land() {
    let inner = MemoryStore::new();
    let post = seed_post(&inner).await;
    let user_b = User::new("userB", "B");
    let store = RivalStore {
        inner: inner.clone(),
        rival_entry: Mutex::new(Some(serde_json::to_value(user_b.summary()).unwrap())),
        field: fields::LIKES,
    };
    let mutator = ToggleListMutator::with_options(store, fast_options(5));

    let user_a = User::new("userA", "A");
    let outcome = mutator
        .add_member(&post.doc_ref(), fields::LIKES, &user_a.summary())
        .await
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::Applied { len: 2 });

    let stored: Post = inner.require_document(&post.id).await.unwrap();
    assert_eq!(likers(&stored), vec!["userB", "userA"]);
}

#[tokio::test]
async fn concurrent_adds_of_the_same_user_converge_to_one_entry() {
    let store = MemoryStore::new();
    let post = seed_post(&store).await;
    let liker = User::new("u1", "Ann").summary();

    let first = ToggleListMutator::new(store.clone());
    let second = ToggleListMutator::new(store.clone());
    let doc = post.doc_ref();
    let (a, b) = tokio::join!(
        first.add_member(&doc, fields::LIKES, &liker),
        second.add_member(&doc, fields::LIKES, &liker),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.changed()).count(), 1);

    let stored: Post = store.require_document(&post.id).await.unwrap();
    assert_eq!(likers(&stored), vec!["u1"]);
}

#[tokio::test]
async fn exhausted_retries_report_conflict_and_write_nothing() {
    let inner = MemoryStore::new();
    let post = seed_post(&inner).await;
    let store = AlwaysStaleStore {
        inner: inner.clone(),
        attempts: AtomicU32::new(0),
    };
    let mutator = ToggleListMutator::with_options(store, fast_options(3));

    let err = mutator
        .add_member(&post.doc_ref(), fields::LIKES, &User::new("u1", "Ann").summary())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { attempts: 3, .. }));
    assert_eq!(mutator.store().attempts.load(Ordering::SeqCst), 3);

    let stored = inner.get(&post.doc_ref()).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn transient_failures_are_retried_within_budget() {
    let inner = MemoryStore::new();
    let post = seed_post(&inner).await;
    let store = FlakyStore {
        inner: inner.clone(),
        failures: AtomicU32::new(2),
    };
    let mutator = ToggleListMutator::with_options(store, fast_options(3));
    let outcome = mutator
        .set_scalar(&post.doc_ref(), fields::BOOKMARKS, "u1", hearth::Membership::Present)
        .await
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::Applied { len: 1 });

    let flaky = FlakyStore {
        inner: inner.clone(),
        failures: AtomicU32::new(5),
    };
    let mutator = ToggleListMutator::with_options(flaky, fast_options(2));
    let err = mutator
        .set_scalar(&post.doc_ref(), fields::BOOKMARKS, "u2", hearth::Membership::Present)
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn missing_document_fails_without_creating_it() {
    let store = MemoryStore::new();
    let mutator = ToggleListMutator::new(store.clone());
    let doc = Post::reference("ghost");

    let err = mutator
        .add_member(&doc, fields::LIKES, &User::new("u1", "Ann").summary())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert!(store.get(&doc).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_field_is_an_empty_list_and_non_lists_are_rejected() {
    let store = MemoryStore::new();
    let doc = DocRef::new("users", "u1");
    store.set(&doc, json!({ "uid": "u1", "friends": "not-a-list" })).await.unwrap();
    let mutator = ToggleListMutator::new(store.clone());

    let outcome = mutator
        .set_scalar(&doc, fields::BOOKMARKS, "p1", hearth::Membership::Present)
        .await
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::Applied { len: 1 });

    let err = mutator
        .set_scalar(&doc, fields::FRIENDS, "u2", hearth::Membership::Present)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest { .. }));
}

#[tokio::test]
async fn removing_a_non_member_writes_nothing() {
    let store = MemoryStore::new();
    let post = seed_post(&store).await;
    let mutator = ToggleListMutator::new(store.clone());

    let outcome = mutator
        .remove_member::<Like>(&post.doc_ref(), fields::LIKES, "nobody")
        .await
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::Unchanged);
    assert_eq!(store.get(&post.doc_ref()).await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn duplicate_in_flight_toggle_is_coalesced() {
    let inner = MemoryStore::new();
    let post = seed_post(&inner).await;
    let store = SlowStore {
        inner: inner.clone(),
        delay: Duration::from_millis(30),
    };
    let mutator = ToggleListMutator::new(store);
    let liker = User::new("u1", "Ann").summary();

    let doc = post.doc_ref();
    let (first, second) = tokio::join!(
        mutator.add_member(&doc, fields::LIKES, &liker),
        mutator.add_member(&doc, fields::LIKES, &liker),
    );
    assert_eq!(first.unwrap(), ToggleOutcome::Applied { len: 1 });
    assert_eq!(second.unwrap(), ToggleOutcome::Coalesced);

    // Once settled, the key can be toggled again.
    let removed = mutator
        .remove_member::<Like>(&post.doc_ref(), fields::LIKES, &liker.uid)
        .await
        .unwrap();
    assert_eq!(removed, ToggleOutcome::Applied { len: 0 });
}

#[tokio::test]
async fn opposite_toggle_waits_for_the_pending_one() {
    let inner = MemoryStore::new();
    let post = seed_post(&inner).await;
    let store = SlowStore {
        inner: inner.clone(),
        delay: Duration::from_millis(30),
    };
    let mutator = ToggleListMutator::new(store);
    let liker = User::new("u1", "Ann").summary();

    let doc = post.doc_ref();
    let (like, unlike) = tokio::join!(
        mutator.add_member(&doc, fields::LIKES, &liker),
        mutator.remove_member::<Like>(&doc, fields::LIKES, &liker.uid),
    );
    assert_eq!(like.unwrap(), ToggleOutcome::Applied { len: 1 });
    assert_eq!(unlike.unwrap(), ToggleOutcome::Applied { len: 0 });

    // The later request wins.
    let stored: Post = inner.require_document(&post.id).await.unwrap();
    assert!(likers(&stored).is_empty());
}

#[tokio::test]
async fn identity_field_comes_from_the_member_type() {
    let store = MemoryStore::new();
    let post = seed_post(&store).await;
    let mutator = ToggleListMutator::new(store.clone());

    let entry = json!({ "uid": "u9", "displayName": "Nine" });
    let op = ToggleOp::Add {
        key: "u9".to_string(),
        entry,
    };
    mutator
        .apply(&post.doc_ref(), fields::LIKES, &Identity::of::<Like>(), op)
        .await
        .unwrap();
    assert_eq!(<Like as Member>::KEY_FIELD, "uid");

    let stored: Post = store.require_document(&post.id).await.unwrap();
    assert_eq!(stored.likes[0].display_name, "Nine");
}
