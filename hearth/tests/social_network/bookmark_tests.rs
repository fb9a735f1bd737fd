use crate::support::*;

#[tokio::test]
async fn bookmark_is_recorded_on_post_and_user() {
    let net = Network::seed().await;
    let outcome = net.social.bookmark_post(&net.post.id, "bob").await.unwrap();
    assert!(outcome.post.changed());
    assert!(outcome.user.changed());

    assert!(net.post().await.bookmarked_by("bob"));
    assert_eq!(net.user("bob").await.bookmarks, vec![net.post.id.clone()]);
}

#[tokio::test]
async fn rebookmarking_is_unchanged_on_both_sides() {
    let net = Network::seed().await;
    net.social.bookmark_post(&net.post.id, "bob").await.unwrap();
    let outcome = net.social.bookmark_post(&net.post.id, "bob").await.unwrap();
    assert_eq!(outcome.post, ToggleOutcome::Unchanged);
    assert_eq!(outcome.user, ToggleOutcome::Unchanged);
}

#[tokio::test]
async fn unbookmark_removes_both_sides() {
    let net = Network::seed().await;
    net.social.bookmark_post(&net.post.id, "bob").await.unwrap();
    net.social.unbookmark_post(&net.post.id, "bob").await.unwrap();
    assert!(!net.post().await.bookmarked_by("bob"));
    assert!(net.user("bob").await.bookmarks.is_empty());
}

#[tokio::test]
async fn bookmark_for_a_missing_user_leaves_the_post_side() {
    let net = Network::seed().await;
    let err = net.social.bookmark_post(&net.post.id, "ghost").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert!(net.post().await.bookmarked_by("ghost"));
}

#[tokio::test]
async fn clear_bookmarks_empties_the_user_only() {
    let net = Network::seed().await;
    let second = net
        .social
        .create_post(&net.ann.summary(), "second", Vec::new())
        .await
        .unwrap();
    net.social.bookmark_post(&net.post.id, "bob").await.unwrap();
    net.social.bookmark_post(&second.id, "bob").await.unwrap();

    assert_eq!(net.social.clear_bookmarks("bob").await.unwrap(), 2);
    assert!(net.user("bob").await.bookmarks.is_empty());
    assert!(net.post().await.bookmarked_by("bob"));
    assert_eq!(net.social.clear_bookmarks("bob").await.unwrap(), 0);
}
