use crate::support::*;

#[tokio::test]
async fn friendship_is_one_sided() {
    let net = Network::seed().await;
    net.social.add_friend("ann", "bob").await.unwrap();
    assert!(net.user("ann").await.is_friend("bob"));
    assert!(!net.user("bob").await.is_friend("ann"));
}

#[tokio::test]
async fn removing_a_friend_who_is_absent_is_unchanged() {
    let net = Network::seed().await;
    let outcome = net.social.remove_friend("ann", "bob").await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Unchanged);
}

#[tokio::test]
async fn add_and_remove_friend() {
    let net = Network::seed().await;
    assert_eq!(net.social.add_friend("ann", "bob").await.unwrap(), ToggleOutcome::Applied { len: 1 });
    assert_eq!(net.social.add_friend("ann", "bob").await.unwrap(), ToggleOutcome::Unchanged);
    assert_eq!(net.social.remove_friend("ann", "bob").await.unwrap(), ToggleOutcome::Applied { len: 0 });
    assert!(net.user("ann").await.friends.is_empty());
}
