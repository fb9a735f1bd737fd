//! The write paths of the application: likes, bookmarks, friends, posts and comments.
//!
//! List mutations go through the [`ToggleListMutator`]; whole-document writes go through the
//! store directly. UI-style callers wrap each action in [`settle`] so a failed mutation is
//! logged instead of escaping into their event loop.

use std::future::Future;

use serde_json::{Map, Value};

use crate::{
    errors::StoreError,
    model::{Comment, Like, Post, User, UserSummary, fields},
    store::{DocumentStore, DocumentStoreExt},
    toggle::{Membership, ToggleListMutator, ToggleOutcome},
    transaction::{TransactionOptions, TxStep, run_transaction},
    types::Document,
    validators::{validate_comment_content, validate_post_content},
};

/// Outcome of a bookmark toggle, which touches the post and the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookmarkOutcome {
    pub post: ToggleOutcome,
    pub user: ToggleOutcome,
}

pub struct Social<S> {
    mutator: ToggleListMutator<S>,
}

impl<S: DocumentStore> Social<S> {
    pub fn new(store: S) -> Self {
        Self {
            mutator: ToggleListMutator::new(store),
        }
    }

    pub fn with_options(store: S, options: TransactionOptions) -> Self {
        Self {
            mutator: ToggleListMutator::with_options(store, options),
        }
    }

    pub fn store(&self) -> &S {
        self.mutator.store()
    }

    pub fn mutator(&self) -> &ToggleListMutator<S> {
        &self.mutator
    }

    fn options(&self) -> &TransactionOptions {
        self.mutator.options()
    }

    /// Adds `liker`'s snapshot to the post's likes. Liking twice keeps the first snapshot.
    pub async fn like_post(&self, post_id: &str, liker: &UserSummary) -> Result<ToggleOutcome, StoreError> {
        self.mutator
            .add_member(&Post::reference(post_id), fields::LIKES, liker)
            .await
    }

    pub async fn unlike_post(&self, post_id: &str, uid: &str) -> Result<ToggleOutcome, StoreError> {
        self.mutator
            .remove_member::<Like>(&Post::reference(post_id), fields::LIKES, uid)
            .await
    }

    /// Likes or unlikes depending on `membership`.
    pub async fn set_like(
        &self,
        post_id: &str,
        liker: &UserSummary,
        membership: Membership,
    ) -> Result<ToggleOutcome, StoreError> {
        match membership {
            Membership::Present => self.like_post(post_id, liker).await,
            Membership::Absent => self.unlike_post(post_id, &liker.uid).await,
        }
    }

    /// Records the bookmark on the post, then on the user.
    ///
    /// The two writes are separate transactions. If the second fails the first stays, and
    /// re-issuing the call completes it.
    pub async fn bookmark_post(&self, post_id: &str, uid: &str) -> Result<BookmarkOutcome, StoreError> {
        self.set_bookmark(post_id, uid, Membership::Present).await
    }

    pub async fn unbookmark_post(&self, post_id: &str, uid: &str) -> Result<BookmarkOutcome, StoreError> {
        self.set_bookmark(post_id, uid, Membership::Absent).await
    }

    async fn set_bookmark(&self, post_id: &str, uid: &str, membership: Membership) -> Result<BookmarkOutcome, StoreError> {
        let post = self
            .mutator
            .set_scalar(&Post::reference(post_id), fields::BOOKMARKS, uid, membership)
            .await?;
        let user = self
            .mutator
            .set_scalar(&User::reference(uid), fields::BOOKMARKS, post_id, membership)
            .await?;
        Ok(BookmarkOutcome { post, user })
    }

    /// Empties the user's bookmark list. Posts keep their record of who bookmarked them.
    pub async fn clear_bookmarks(&self, uid: &str) -> Result<usize, StoreError> {
        let doc = User::reference(uid);
        run_transaction(self.store(), &doc, self.options(), |current| {
            let cleared = match current.get(fields::BOOKMARKS) {
                Some(Value::Array(items)) => items.len(),
                _ => 0,
            };
            if cleared == 0 {
                return Ok(TxStep::Skip(0));
            }
            let mut data = current.clone();
            if let Value::Object(fields_map) = &mut data {
                fields_map.insert(fields::BOOKMARKS.to_string(), Value::Array(Vec::new()));
            }
            Ok(TxStep::Write(data, cleared))
        })
        .await
    }

    pub async fn add_friend(&self, uid: &str, friend: &str) -> Result<ToggleOutcome, StoreError> {
        self.set_friend(uid, friend, Membership::Present).await
    }

    pub async fn remove_friend(&self, uid: &str, friend: &str) -> Result<ToggleOutcome, StoreError> {
        self.set_friend(uid, friend, Membership::Absent).await
    }

    async fn set_friend(&self, uid: &str, friend: &str, membership: Membership) -> Result<ToggleOutcome, StoreError> {
        if uid == friend {
            return Err(StoreError::invalid("a user cannot befriend themselves"));
        }
        self.mutator
            .set_scalar(&User::reference(uid), fields::FRIENDS, friend, membership)
            .await
    }

    pub async fn create_post(
        &self,
        author: &UserSummary,
        content: &str,
        images: Vec<String>,
    ) -> Result<Post, StoreError> {
        let content = validate_post_content(content, &images)?;
        let post = Post::new(author.clone(), content, images);
        self.store().create_document(&post).await?;
        log::debug!("social: {} created post {}", author.uid, post.id);
        Ok(post)
    }

    /// Replaces the post's text, leaving every other field as stored.
    ///
    /// Text that normalizes to empty is accepted only if the post carries images.
    pub async fn edit_post(&self, post_id: &str, content: &str) -> Result<(), StoreError> {
        let doc = Post::reference(post_id);
        run_transaction(self.store(), &doc, self.options(), |current| {
            let images: Vec<String> = match current.get("images") {
                Some(images) if !images.is_null() => serde_json::from_value(images.clone())?,
                _ => Vec::new(),
            };
            let normalized = validate_post_content(content, &images)?;
            if current.get(fields::CONTENT).and_then(Value::as_str) == Some(normalized.as_str()) {
                return Ok(TxStep::Skip(()));
            }
            let Value::Object(existing) = current else {
                return Err(StoreError::invalid(format!("{doc} is not a JSON object")));
            };
            let mut merged: Map<String, Value> = existing.clone();
            merged.insert(fields::CONTENT.to_string(), Value::String(normalized));
            Ok(TxStep::Write(Value::Object(merged), ()))
        })
        .await
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<bool, StoreError> {
        self.store().delete(&Post::reference(post_id)).await
    }

    pub async fn add_comment(&self, post_id: &str, author: &UserSummary, content: &str) -> Result<Comment, StoreError> {
        let content = validate_comment_content(content)?;
        let comment = Comment::new(author.clone(), content);
        self.mutator
            .add_member(&Post::reference(post_id), fields::COMMENTS, &comment)
            .await?;
        Ok(comment)
    }

    pub async fn remove_comment(&self, post_id: &str, comment_id: &str) -> Result<ToggleOutcome, StoreError> {
        self.mutator
            .remove_member::<Comment>(&Post::reference(post_id), fields::COMMENTS, comment_id)
            .await
    }

    /// Increments the post's view counter; returns the new count.
    pub async fn record_view(&self, post_id: &str) -> Result<u64, StoreError> {
        let doc = Post::reference(post_id);
        run_transaction(self.store(), &doc, self.options(), |current| {
            let views = current.get(fields::VIEWS).and_then(Value::as_u64).unwrap_or(0) + 1;
            let mut data = current.clone();
            let Value::Object(fields_map) = &mut data else {
                return Err(StoreError::invalid(format!("{doc} is not a JSON object")));
            };
            fields_map.insert(fields::VIEWS.to_string(), Value::from(views));
            Ok(TxStep::Write(data, views))
        })
        .await
    }
}

/// Awaits a mutation, logging its failure instead of returning it.
pub async fn settle<T, F>(action: &str, mutation: F) -> Option<T>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match mutation.await {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("{action} failed: {err}");
            None
        }
    }
}
