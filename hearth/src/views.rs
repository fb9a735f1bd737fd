//! Read models the application renders, each a [`LiveView`] over store and realtime feeds.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::{
    errors::StoreError,
    live::{LiveView, Projector},
    model::{Post, PresenceRecord, User, UserSummary, fields},
    query::{Query, SortOrder},
    realtime::{PRESENCE_ROOT, RealtimeStore, presence_path},
    store::DocumentStore,
    types::Document,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// `None` until the profile document exists.
    pub user: Option<User>,
    pub presence: PresenceRecord,
}

/// Presence as two independent fields; `None` means the value has not arrived yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub online: Option<bool>,
    pub last_online: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendStatus {
    pub uid: String,
    /// `None` when the friend's profile is missing.
    pub summary: Option<UserSummary>,
    pub online: bool,
    pub last_online: Option<i64>,
}

/// What the viewer sees under a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEngagement {
    pub exists: bool,
    pub liked_by_me: bool,
    pub bookmarked_by_me: bool,
    pub like_count: usize,
    pub comment_count: usize,
    pub views: u64,
}

impl PostEngagement {
    pub fn of(post: &Post, viewer: &str) -> Self {
        Self {
            exists: true,
            liked_by_me: post.liked_by(viewer),
            bookmarked_by_me: post.bookmarked_by(viewer),
            like_count: post.likes.len(),
            comment_count: post.comments.len(),
            views: post.views,
        }
    }
}

fn newest_posts() -> Query {
    Query::collection(Post::COLLECTION).order_by(fields::CREATED_AT, SortOrder::Desc)
}

/// The user's profile document joined with their presence node.
pub async fn profile<S, R>(store: &S, realtime: &R, uid: &str) -> Result<LiveView<Profile>, StoreError>
where
    S: DocumentStore + ?Sized,
    R: RealtimeStore + ?Sized,
{
    let user = store.watch_document(&User::reference(uid)).await?;
    let presence = realtime.watch(&presence_path(uid)).await?;
    Ok(Projector::new().feed(user).feed(presence).activate(|slots| Profile {
        user: slots.decode_document(0),
        presence: slots.decode_value(1).unwrap_or_default(),
    }))
}

/// Online flag and last-seen time, watched separately so either one re-renders on its own.
pub async fn presence<R>(realtime: &R, uid: &str) -> Result<LiveView<PresenceView>, StoreError>
where
    R: RealtimeStore + ?Sized,
{
    let node = presence_path(uid);
    let online = realtime.watch(&format!("{node}/{}", fields::ONLINE)).await?;
    let last_online = realtime.watch(&format!("{node}/{}", fields::LAST_ONLINE)).await?;
    Ok(Projector::new().feed(online).feed(last_online).activate(|slots| PresenceView {
        online: slots.value(0).and_then(Value::as_bool),
        last_online: slots.value(1).and_then(Value::as_i64),
    }))
}

/// Posts bookmarked by `uid`, newest first.
pub async fn bookmarks<S>(store: &S, uid: &str) -> Result<LiveView<Vec<Post>>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    let query = newest_posts().where_array_contains(fields::BOOKMARKS, uid);
    let results = store.watch_query(&query).await?;
    Ok(Projector::new().feed(results).activate(|slots| slots.decode_results(0)))
}

/// The `limit` newest posts.
pub async fn news_feed<S>(store: &S, limit: usize) -> Result<LiveView<Vec<Post>>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    let results = store.watch_query(&newest_posts().limit(limit)).await?;
    Ok(Projector::new().feed(results).activate(|slots| slots.decode_results(0)))
}

/// `uid`'s friends, in the order they were added, with their online status.
pub async fn friends<S, R>(store: &S, realtime: &R, uid: &str) -> Result<LiveView<Vec<FriendStatus>>, StoreError>
where
    S: DocumentStore + ?Sized,
    R: RealtimeStore + ?Sized,
{
    let me = store.watch_document(&User::reference(uid)).await?;
    let users = store.watch_query(&Query::collection(User::COLLECTION)).await?;
    let presence = realtime.watch(PRESENCE_ROOT).await?;

    Ok(Projector::new().feed(me).feed(users).feed(presence).activate(|slots| {
        let Some(me) = slots.decode_document::<User>(0) else {
            return Vec::new();
        };
        let profiles: HashMap<String, User> = slots
            .decode_results::<User>(1)
            .into_iter()
            .map(|user| (user.uid.clone(), user))
            .collect();
        let presence = slots.value(2);

        me.friends
            .iter()
            .map(|friend| {
                let record: PresenceRecord = presence
                    .and_then(|nodes| nodes.get(friend))
                    .and_then(|node| serde_json::from_value(node.clone()).ok())
                    .unwrap_or_default();
                FriendStatus {
                    uid: friend.clone(),
                    summary: profiles.get(friend).map(User::summary),
                    online: record.online,
                    last_online: record.last_online,
                }
            })
            .collect()
    }))
}

/// Like, bookmark and counter state of one post as seen by `viewer`.
pub async fn post_engagement<S>(store: &S, post_id: &str, viewer: &str) -> Result<LiveView<PostEngagement>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    let post = store.watch_document(&Post::reference(post_id)).await?;
    let viewer = viewer.to_string();
    Ok(Projector::new().feed(post).activate(move |slots| {
        slots
            .decode_document::<Post>(0)
            .map(|post| PostEngagement::of(&post, &viewer))
            .unwrap_or_default()
    }))
}
