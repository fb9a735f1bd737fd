use crate::support::*;

#[tokio::test]
async fn create_post_normalizes_content() {
    let net = Network::seed().await;
    let post = net
        .social
        .create_post(&net.bob.summary(), "  hello there  ", Vec::new())
        .await
        .unwrap();
    assert_eq!(post.content, "hello there");
    let stored: Post = net.social.store().require_document(&post.id).await.unwrap();
    assert_eq!(stored, post);
}

#[tokio::test]
async fn empty_post_needs_an_image() {
    let net = Network::seed().await;
    let err = net
        .social
        .create_post(&net.bob.summary(), "   ", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let post = net
        .social
        .create_post(&net.bob.summary(), "", vec!["https://img.example/cat.png".into()])
        .await
        .unwrap();
    assert!(post.content.is_empty());
}

#[tokio::test]
async fn comments_are_added_and_removed_by_id() {
    let net = Network::seed().await;
    let first = net.social.add_comment(&net.post.id, &net.bob.summary(), "nice").await.unwrap();
    let second = net.social.add_comment(&net.post.id, &net.ann.summary(), "thanks").await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(net.post().await.comments.len(), 2);

    net.social.remove_comment(&net.post.id, &first.id).await.unwrap();
    let comments = net.post().await.comments;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].content, "thanks");
}

#[tokio::test]
async fn blank_comment_is_rejected() {
    let net = Network::seed().await;
    let err = net
        .social
        .add_comment(&net.post.id, &net.bob.summary(), " ")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(net.post().await.comments.is_empty());
}

#[tokio::test]
async fn concurrent_views_are_all_counted() {
    let net = Network::seed().await;
    let other = net.second_client();
    let (first, second) = tokio::join!(net.social.record_view(&net.post.id), other.record_view(&net.post.id));
    let mut counts = vec![first.unwrap(), second.unwrap()];
    counts.sort();
    assert_eq!(counts, vec![1, 2]);
    assert_eq!(net.post().await.views, 2);
}

#[tokio::test]
async fn deleted_post_rejects_toggles() {
    let net = Network::seed().await;
    assert!(net.social.delete_post(&net.post.id).await.unwrap());
    assert!(!net.social.delete_post(&net.post.id).await.unwrap());
    assert!(matches!(
        net.social.like_post(&net.post.id, &net.bob.summary()).await,
        Err(StoreError::NotFound { .. })
    ));
}
