use crate::support::*;

#[tokio::test]
async fn like_then_unlike_round_trip() {
    let net = Network::seed().await;
    let outcome = net.social.like_post(&net.post.id, &net.bob.summary()).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Applied { len: 1 });
    assert!(net.post().await.liked_by("bob"));

    let outcome = net.social.unlike_post(&net.post.id, "bob").await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Applied { len: 0 });
    assert!(net.post().await.likes.is_empty());
}

#[tokio::test]
async fn liking_twice_keeps_one_entry() {
    let net = Network::seed().await;
    net.social.like_post(&net.post.id, &net.bob.summary()).await.unwrap();

    let mut renamed = net.bob.summary();
    renamed.display_name = "Robert".into();
    let outcome = net.social.like_post(&net.post.id, &renamed).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Unchanged);

    let post = net.post().await;
    assert_eq!(post.likes.len(), 1);
    assert_eq!(post.likes[0].display_name, "Bob");
}

#[tokio::test]
async fn clients_liking_at_once_both_land() {
    let net = Network::seed().await;
    let other = net.second_client();
    let (ann_summary, bob_summary) = (net.ann.summary(), net.bob.summary());
    let (ann, bob) = tokio::join!(
        net.social.like_post(&net.post.id, &ann_summary),
        other.like_post(&net.post.id, &bob_summary),
    );
    assert!(ann.unwrap().changed());
    assert!(bob.unwrap().changed());

    let post = net.post().await;
    assert!(post.liked_by("ann"));
    assert!(post.liked_by("bob"));
    assert_eq!(post.likes.len(), 2);
}

#[tokio::test]
async fn liking_a_missing_post_fails_without_creating_it() {
    let net = Network::seed().await;
    let err = net.social.like_post("ghost", &net.bob.summary()).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert!(net.social.store().get_document::<Post>("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn set_like_follows_the_requested_membership() {
    use hearth::Membership;

    let net = Network::seed().await;
    let bob = net.bob.summary();
    net.social.set_like(&net.post.id, &bob, Membership::Present).await.unwrap();
    assert!(net.post().await.liked_by("bob"));
    net.social.set_like(&net.post.id, &bob, Membership::Absent).await.unwrap();
    assert!(!net.post().await.liked_by("bob"));
}
