use std::time::Duration;

use anyhow::{Context, Result};
use hearth::{
    DocumentStoreExt, MemoryStore,
    model::{Post, User},
    realtime::{MemoryRealtime, announce_presence},
    social::Social,
    views,
};
use tokio::time::timeout;

use crate::output::OutputManager;

const VIEW_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs the like race, bookmark and presence scenarios against the in-memory backends.
pub async fn handle_demo(output: &OutputManager) -> Result<()> {
    let store = MemoryStore::new();
    let ann = User::new("ann", "Ann 🦊");
    let bob = User::new("bob", "Bob");
    store.create_document(&ann).await?;
    store.create_document(&bob).await?;

    let ann_client = Social::new(store.clone());
    let bob_client = Social::new(store.clone());
    let post = ann_client
        .create_post(&ann.summary(), "Who's coming to the picnic?", Vec::new())
        .await?;

    like_race(output, &ann_client, &bob_client, &post, &ann, &bob).await?;
    bookmarks(output, &bob_client, &post, &bob).await?;
    presence(output, &ann).await?;

    output.success("Demo finished");
    Ok(())
}

async fn like_race(
    output: &OutputManager,
    ann_client: &Social<MemoryStore>,
    bob_client: &Social<MemoryStore>,
    post: &Post,
    ann: &User,
    bob: &User,
) -> Result<()> {
    output.heading("Concurrent likes");
    let (ann_summary, bob_summary) = (ann.summary(), bob.summary());
    let (ann_like, bob_like) = tokio::join!(
        ann_client.like_post(&post.id, &ann_summary),
        bob_client.like_post(&post.id, &bob_summary),
    );
    output.verbose(&format!("ann: {:?}, bob: {:?}", ann_like?, bob_like?));

    let stored: Post = ann_client.store().require_document(&post.id).await?;
    for like in &stored.likes {
        output.bullet(&format!("liked by {}", like.plain_name()));
    }
    output.key_value("likes", &stored.likes.len().to_string());

    let again = ann_client.like_post(&post.id, &ann.summary()).await?;
    output.key_value("liking again", &format!("{again:?}"));
    Ok(())
}

async fn bookmarks(output: &OutputManager, client: &Social<MemoryStore>, post: &Post, user: &User) -> Result<()> {
    output.heading("Bookmarks");
    let mut view = views::bookmarks(client.store(), &user.uid).await?;
    client.bookmark_post(&post.id, &user.uid).await?;

    let bookmarked = timeout(VIEW_TIMEOUT, view.wait_for(|posts| !posts.is_empty()))
        .await
        .context("bookmark view did not update")?
        .unwrap_or_default();
    for post in &bookmarked {
        output.bullet(&format!("{} {}", post.id, post.content));
    }

    let cleared = client.clear_bookmarks(&user.uid).await?;
    output.key_value("cleared from profile", &cleared.to_string());
    view.release();
    Ok(())
}

async fn presence(output: &OutputManager, user: &User) -> Result<()> {
    output.heading("Presence");
    let database = MemoryRealtime::new();
    let watcher = database.connect();
    let mut view = views::presence(&watcher, &user.uid).await?;

    let session = database.connect();
    announce_presence(&session, &user.uid).await?;
    let online = timeout(VIEW_TIMEOUT, view.wait_for(|presence| presence.online == Some(true)))
        .await
        .context("presence view did not go online")?;
    output.key_value("online", &format!("{:?}", online.and_then(|presence| presence.online)));

    drop(session);
    let offline = timeout(VIEW_TIMEOUT, view.wait_for(|presence| presence.last_online.is_some()))
        .await
        .context("presence view did not go offline")?;
    if let Some(presence) = offline {
        output.key_value("online", &format!("{:?}", presence.online));
        output.key_value("last online", &format!("{:?}", presence.last_online));
    }
    view.release();
    Ok(())
}
