use anyhow::Result;
use clap::Subcommand;
use hearth::{LiveView, views};
use serde::Serialize;

use crate::{
    context::AppContext,
    examples::ExampleGroup,
    output::{OutputManager, TableDisplay},
};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Live Views",
    commands: &[
        "hearth watch feed --limit 5          # Re-print the newest posts on every change",
        "hearth watch bookmarks ann           # Follow ann's bookmarks",
        "hearth watch post <POST> --as ann    # Follow likes and comments of one post",
    ],
}];

#[derive(Subcommand)]
pub enum WatchCommands {
    /// Newest posts
    Feed {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Posts bookmarked by UID
    Bookmarks { uid: String },
    /// Engagement of one post as seen by a user
    Post {
        post: String,
        #[arg(long = "as", value_name = "UID")]
        viewer: String,
    },
}

pub async fn handle_watch_commands(command: WatchCommands, ctx: &AppContext, output: &OutputManager) -> Result<()> {
    let store = ctx.store().await?;
    match command {
        WatchCommands::Feed { limit } => {
            let view = views::news_feed(&store, limit).await?;
            follow(view, "News feed", output, |posts| posts.as_slice()).await
        }
        WatchCommands::Bookmarks { uid } => {
            let view = views::bookmarks(&store, &uid).await?;
            follow(view, &format!("Bookmarks of {uid}"), output, |posts| posts.as_slice()).await
        }
        WatchCommands::Post { post, viewer } => {
            let view = views::post_engagement(&store, &post, &viewer).await?;
            follow(view, &format!("Post {post}"), output, |engagement| engagement).await
        }
    }
}

/// Prints the view on every publish until Ctrl-C or until its feeds end.
async fn follow<V, T, F>(mut view: LiveView<V>, title: &str, output: &OutputManager, project: F) -> Result<()>
where
    V: Clone,
    T: Serialize + TableDisplay + ?Sized,
    F: Fn(&V) -> &T,
{
    output.info("Watching; press Ctrl-C to stop");
    loop {
        tokio::select! {
            published = view.next() => {
                let Some(current) = published else {
                    output.warning("Feed closed");
                    break;
                };
                output.heading(title);
                output.display(project(&current))?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }
    view.release();
    Ok(())
}
