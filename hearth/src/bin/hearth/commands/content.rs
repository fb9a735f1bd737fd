use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use hearth::{
    DocumentStore, DocumentStoreExt, Filter, Query, RedisStore, SortOrder, ToggleOutcome,
    model::{Post, User, UserSummary, fields},
    social::Social,
    types::Document,
};

use crate::{context::AppContext, examples::ExampleGroup, output::OutputManager};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Browse",
        commands: &[
            "hearth posts                                   # Newest posts",
            "hearth posts --bookmarked-by ann               # Posts ann bookmarked",
            "hearth posts --filter author.uid:eq:bob        # Posts written by bob",
        ],
    },
    ExampleGroup {
        title: "React",
        commands: &[
            "hearth like <POST> --as ann",
            "hearth bookmark <POST> --as ann",
            "hearth comment <POST> --as bob \"nice one\"",
            "hearth friend add ann bob",
        ],
    },
];

#[derive(Args)]
pub struct PostsArgs {
    /// Filter as field:op:value (ops: eq, contains); repeatable
    #[arg(long = "filter", value_name = "FILTER")]
    pub filters: Vec<String>,

    /// Only posts bookmarked by this user
    #[arg(long, value_name = "UID")]
    pub bookmarked_by: Option<String>,

    /// Maximum number of posts
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args)]
pub struct ReactArgs {
    /// Post id
    pub post: String,

    /// Acting user
    #[arg(long = "as", value_name = "UID")]
    pub actor: String,
}

#[derive(Args)]
pub struct CommentArgs {
    /// Post id
    pub post: String,

    /// Acting user
    #[arg(long = "as", value_name = "UID")]
    pub actor: String,

    /// Comment text
    pub text: String,
}

#[derive(Subcommand)]
pub enum FriendCommands {
    /// Add FRIEND to UID's friends
    Add { uid: String, friend: String },
    /// Remove FRIEND from UID's friends
    Remove { uid: String, friend: String },
}

#[derive(Clone, Copy)]
pub enum Reaction {
    Like,
    Unlike,
    Bookmark,
    Unbookmark,
}

const SEED_USERS: &[(&str, &str)] = &[("ann", "Ann 🦊"), ("bob", "Bob"), ("cy", "Cy 🌵")];

const SEED_POSTS: &[(&str, &str)] = &[
    ("ann", "First light over the harbour this morning."),
    ("bob", "Anyone up for a board game night on Friday?"),
    ("cy", "Repotted every cactus I own. Send help."),
];

pub async fn handle_seed(ctx: &AppContext, output: &OutputManager) -> Result<()> {
    let social = ctx.social().await?;
    output.heading("Seeding demo data");

    for (uid, name) in SEED_USERS {
        let mut user = User::new(*uid, *name);
        user.friends = SEED_USERS
            .iter()
            .map(|(other, _)| other.to_string())
            .filter(|other| other.as_str() != *uid)
            .collect();
        social.store().put_document(&user).await?;
        output.bullet(&format!("user {uid} ({name})"));
    }

    for (uid, content) in SEED_POSTS {
        let author: User = social.store().require_document(uid).await?;
        let post = social.create_post(&author.summary(), content, Vec::new()).await?;
        output.bullet(&format!("post {} by {uid}", post.id));
    }

    output.success("Seed complete");
    Ok(())
}

pub fn build_posts_query(args: &PostsArgs) -> Result<Query> {
    let mut query = Query::collection(Post::COLLECTION)
        .order_by(fields::CREATED_AT, SortOrder::Desc)
        .limit(args.limit);
    for descriptor in &args.filters {
        let filter = Filter::parse(descriptor).with_context(|| format!("Invalid filter '{descriptor}'"))?;
        query = query.filter(filter);
    }
    if let Some(uid) = &args.bookmarked_by {
        query = query.where_array_contains(fields::BOOKMARKS, uid.as_str());
    }
    Ok(query)
}

pub async fn handle_posts(args: PostsArgs, ctx: &AppContext, output: &OutputManager) -> Result<()> {
    let store = ctx.store().await?;
    let query = build_posts_query(&args)?;
    output.verbose(&format!("query on {}: {} filter(s)", query.collection, query.filters.len()));

    let posts: Vec<Post> = store
        .query(&query)
        .await?
        .iter()
        .map(|snapshot| snapshot.decode::<Post>())
        .collect::<Result<_, _>>()?;
    if posts.is_empty() {
        output.info("No posts found");
        return Ok(());
    }
    output.display(posts.as_slice())
}

async fn actor_summary(store: &RedisStore, uid: &str) -> Result<UserSummary> {
    let user: User = store
        .require_document(uid)
        .await
        .with_context(|| format!("Unknown user '{uid}'"))?;
    Ok(user.summary())
}

fn report(output: &OutputManager, action: &str, outcome: ToggleOutcome) {
    match outcome {
        ToggleOutcome::Applied { len } => output.success(&format!("{action} ({len} in list)")),
        ToggleOutcome::Unchanged => output.info(&format!("{action}: already in that state")),
        ToggleOutcome::Coalesced => output.info(&format!("{action}: already in flight")),
    }
}

pub async fn handle_reaction(
    reaction: Reaction,
    args: ReactArgs,
    ctx: &AppContext,
    output: &OutputManager,
) -> Result<()> {
    let social = ctx.social().await?;
    match reaction {
        Reaction::Like => {
            let liker = actor_summary(social.store(), &args.actor).await?;
            report(output, "Liked", social.like_post(&args.post, &liker).await?);
        }
        Reaction::Unlike => report(output, "Unliked", social.unlike_post(&args.post, &args.actor).await?),
        Reaction::Bookmark => {
            let outcome = social.bookmark_post(&args.post, &args.actor).await?;
            report(output, "Bookmarked on post", outcome.post);
            report(output, "Bookmarked for user", outcome.user);
        }
        Reaction::Unbookmark => {
            let outcome = social.unbookmark_post(&args.post, &args.actor).await?;
            report(output, "Unbookmarked on post", outcome.post);
            report(output, "Unbookmarked for user", outcome.user);
        }
    }
    Ok(())
}

pub async fn handle_friend(command: FriendCommands, ctx: &AppContext, output: &OutputManager) -> Result<()> {
    let social: Social<RedisStore> = ctx.social().await?;
    match command {
        FriendCommands::Add { uid, friend } => {
            report(output, &format!("{friend} added"), social.add_friend(&uid, &friend).await?);
        }
        FriendCommands::Remove { uid, friend } => {
            report(output, &format!("{friend} removed"), social.remove_friend(&uid, &friend).await?);
        }
    }
    Ok(())
}

pub async fn handle_comment(args: CommentArgs, ctx: &AppContext, output: &OutputManager) -> Result<()> {
    let social = ctx.social().await?;
    let author = actor_summary(social.store(), &args.actor).await?;
    let comment = social.add_comment(&args.post, &author, &args.text).await?;
    output.success(&format!("Comment {} added", comment.id));
    Ok(())
}
