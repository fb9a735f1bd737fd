//! Views over the in-memory backends: recomputation, teardown, presence.

use std::time::Duration;

use hearth::{
    DocumentStore, DocumentStoreExt, MemoryStore, Projector,
    model::{Post, User},
    realtime::{MemoryRealtime, RealtimeStore, RtValue, announce_presence},
    social::Social,
    types::Document,
    views,
};
use serde_json::json;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn presence_view_renders_when_either_field_emits() {
    let database = MemoryRealtime::new();
    let conn = database.connect();
    let mut view = views::presence(&conn, "u1").await.unwrap();

    // Both nodes are absent; the view still renders.
    let initial = timeout(WAIT, view.wait_for(|_| true)).await.unwrap().unwrap();
    assert_eq!(initial.online, None);

    conn.set("users/u1/lastOnline", RtValue::Value(json!(1_700_000_000_000i64)))
        .await
        .unwrap();
    let seen = timeout(WAIT, view.wait_for(|presence| presence.last_online.is_some()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.online, None);
    assert_eq!(seen.last_online, Some(1_700_000_000_000));

    conn.set("users/u1/online", true.into()).await.unwrap();
    let online = timeout(WAIT, view.wait_for(|presence| presence.online == Some(true)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(online.last_online, Some(1_700_000_000_000));
}

#[tokio::test]
async fn profile_goes_offline_when_the_session_drops() {
    let store = MemoryStore::new();
    let database = MemoryRealtime::new();
    let observer = database.connect();
    store.create_document(&User::new("u1", "Ann")).await.unwrap();

    let mut view = views::profile(&store, &observer, "u1").await.unwrap();
    let session = database.connect();
    announce_presence(&session, "u1").await.unwrap();
    let online = timeout(WAIT, view.wait_for(|profile| profile.presence.online))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(online.user.map(|user| user.display_name), Some("Ann".to_string()));

    drop(session);
    let offline = timeout(
        WAIT,
        view.wait_for(|profile| !profile.presence.online && profile.presence.last_online.is_some()),
    )
    .await
    .unwrap();
    assert!(offline.is_some());
}

#[tokio::test]
async fn released_view_tears_down_every_feed() {
    let store = MemoryStore::new();
    let database = MemoryRealtime::new();
    let conn = database.connect();
    store.create_document(&User::new("u1", "Ann")).await.unwrap();

    let view = views::friends(&store, &conn, "u1").await.unwrap();
    assert_eq!(store.live_feed_count(), 2);
    assert_eq!(database.live_feed_count(), 1);

    view.release();
    view.release();
    wait_until(|| store.live_feed_count() == 0 && database.live_feed_count() == 0).await;
}

#[tokio::test]
async fn dropping_a_view_releases_it() {
    let store = MemoryStore::new();
    let view = views::news_feed(&store, 10).await.unwrap();
    assert_eq!(store.live_feed_count(), 1);
    drop(view);
    wait_until(|| store.live_feed_count() == 0).await;
}

#[tokio::test]
async fn bookmarks_view_follows_toggles_newest_first() {
    let store = MemoryStore::new();
    let social = Social::new(store.clone());
    let user = User::new("u1", "Ann");
    store.create_document(&user).await.unwrap();

    let mut older = Post::new(user.summary(), "older", Vec::new());
    older.created_at = 1_000;
    let mut newer = Post::new(user.summary(), "newer", Vec::new());
    newer.created_at = 2_000;
    store.create_document(&older).await.unwrap();
    store.create_document(&newer).await.unwrap();

    let mut view = views::bookmarks(&store, "u1").await.unwrap();
    social.bookmark_post(&older.id, "u1").await.unwrap();
    social.bookmark_post(&newer.id, "u1").await.unwrap();

    let both = timeout(WAIT, view.wait_for(|posts| posts.len() == 2))
        .await
        .unwrap()
        .unwrap();
    let contents: Vec<&str> = both.iter().map(|post| post.content.as_str()).collect();
    assert_eq!(contents, vec!["newer", "older"]);

    social.unbookmark_post(&newer.id, "u1").await.unwrap();
    let one = timeout(WAIT, view.wait_for(|posts| posts.len() == 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one[0].id, older.id);
}

#[tokio::test]
async fn engagement_view_tracks_the_viewer() {
    let store = MemoryStore::new();
    let social = Social::new(store.clone());
    let ann = User::new("ann", "Ann");
    let bob = User::new("bob", "Bob");
    store.create_document(&ann).await.unwrap();
    store.create_document(&bob).await.unwrap();
    let post = social.create_post(&ann.summary(), "hi", Vec::new()).await.unwrap();

    let mut view = views::post_engagement(&store, &post.id, "bob").await.unwrap();
    social.like_post(&post.id, &bob.summary()).await.unwrap();
    social.add_comment(&post.id, &ann.summary(), "thanks").await.unwrap();

    let engagement = timeout(WAIT, view.wait_for(|state| state.liked_by_me && state.comment_count == 1))
        .await
        .unwrap()
        .unwrap();
    assert!(engagement.exists);
    assert_eq!(engagement.like_count, 1);
    assert!(!engagement.bookmarked_by_me);

    social.delete_post(&post.id).await.unwrap();
    let gone = timeout(WAIT, view.wait_for(|state| !state.exists)).await.unwrap().unwrap();
    assert_eq!(gone.like_count, 0);
}

#[tokio::test]
async fn friends_view_joins_profiles_and_presence() {
    let store = MemoryStore::new();
    let social = Social::new(store.clone());
    let database = MemoryRealtime::new();
    let observer = database.connect();
    for (uid, name) in [("ann", "Ann"), ("bob", "Bob"), ("cy", "Cy")] {
        store.create_document(&User::new(uid, name)).await.unwrap();
    }

    let mut view = views::friends(&store, &observer, "ann").await.unwrap();
    social.add_friend("ann", "bob").await.unwrap();
    social.add_friend("ann", "cy").await.unwrap();
    let bob_session = database.connect();
    announce_presence(&bob_session, "bob").await.unwrap();

    let friends = timeout(
        WAIT,
        view.wait_for(|friends| friends.len() == 2 && friends.iter().any(|friend| friend.online)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(friends[0].uid, "bob");
    assert!(friends[0].online);
    assert_eq!(friends[1].summary.as_ref().map(|summary| summary.display_name.as_str()), Some("Cy"));
    assert!(!friends[1].online);
}

#[tokio::test]
async fn absent_document_still_publishes() {
    let store = MemoryStore::new();
    let feed = store.watch_document(&User::reference("nobody")).await.unwrap();
    let mut view = Projector::new().feed(feed).activate(|slots| slots.document(0).is_some());
    let first = timeout(WAIT, view.next()).await.unwrap();
    assert_eq!(first, Some(false));
}
