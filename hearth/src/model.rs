//! Documents and embedded entries of the social network.
//!
//! Field names follow the stored JSON layout (`displayName`, `photoURL`, `createdAt`).
//! Timestamps are milliseconds since the Unix epoch. Presence (online flag and last-seen time)
//! is not part of [`User`]; it lives in the realtime store as a [`PresenceRecord`].

use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    Document, Member,
    errors::{ValidationError, ValidationIssue, ValidationResult},
    id::generate_document_id,
    validators::{is_valid_email, is_valid_url},
};

/// List and scalar field names used by mutations and queries.
pub mod fields {
    pub const LIKES: &str = "likes";
    pub const COMMENTS: &str = "comments";
    pub const BOOKMARKS: &str = "bookmarks";
    pub const FRIENDS: &str = "friends";
    pub const CONTENT: &str = "content";
    pub const VIEWS: &str = "views";
    pub const CREATED_AT: &str = "createdAt";
    pub const ONLINE: &str = "online";
    pub const LAST_ONLINE: &str = "lastOnline";
}

static EMOJI_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{FE0F}\x{200D}]+").expect("emoji pattern is valid")
});

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[derive(Document, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[document(collection = "users")]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[document(id)]
    pub uid: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub friends: Vec<String>,
    /// Ids of bookmarked posts.
    #[serde(default)]
    pub bookmarks: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub music: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl User {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
            email: None,
            photo_url: None,
            emoji: None,
            created_at: now_millis(),
            friends: Vec::new(),
            bookmarks: Vec::new(),
            groups: Vec::new(),
            music: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Snapshot embedded in likes, comments and post authorship.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            uid: self.uid.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
            emoji: self.emoji.clone(),
        }
    }

    pub fn is_friend(&self, uid: &str) -> bool {
        self.friends.iter().any(|friend| friend == uid)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        let mut issues = Vec::new();
        if self.uid.trim().is_empty() {
            issues.push(ValidationIssue::new("uid", "validation.empty", "uid must not be empty"));
        }
        if self.display_name.trim().is_empty() {
            issues.push(ValidationIssue::new(
                "displayName",
                "validation.empty",
                "display name must not be empty",
            ));
        }
        if let Some(email) = &self.email
            && !is_valid_email(email)
        {
            issues.push(ValidationIssue::new("email", "validation.email", "invalid email address"));
        }
        if let Some(photo_url) = &self.photo_url
            && !is_valid_url(photo_url)
        {
            issues.push(ValidationIssue::new("photoURL", "validation.url", "invalid photo URL"));
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

/// Denormalized copy of a user taken when they liked, commented or posted.
///
/// It is never refreshed: a later rename does not rewrite old likes.
#[derive(Member, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[member(key)]
    pub uid: String,
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

/// A like is the liker's snapshot.
pub type Like = UserSummary;

impl UserSummary {
    /// Display name with emoji removed.
    pub fn plain_name(&self) -> String {
        EMOJI_RUN.replace_all(&self.display_name, "").trim().to_string()
    }

    /// Emoji used in place of a missing avatar: the explicit one, else those in the name.
    pub fn avatar_glyph(&self) -> Option<String> {
        if let Some(emoji) = self.emoji.as_ref().filter(|emoji| !emoji.is_empty()) {
            return Some(emoji.clone());
        }
        let glyph: String = EMOJI_RUN.find_iter(&self.display_name).map(|m| m.as_str()).collect();
        (!glyph.is_empty()).then_some(glyph)
    }
}

#[derive(Member, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[member(key)]
    pub id: String,
    pub author: UserSummary,
    pub content: String,
    pub created_at: i64,
}

impl Comment {
    pub fn new(author: UserSummary, content: impl Into<String>) -> Self {
        Self {
            id: generate_document_id(),
            author,
            content: content.into(),
            created_at: now_millis(),
        }
    }
}

#[derive(Document, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[document(collection = "posts")]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[document(id)]
    pub id: String,
    pub author: UserSummary,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: i64,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: Vec<Like>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Uids of users who bookmarked the post.
    #[serde(default)]
    pub bookmarks: Vec<String>,
}

impl Post {
    pub fn new(author: UserSummary, content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            id: generate_document_id(),
            author,
            content: content.into(),
            images,
            created_at: now_millis(),
            views: 0,
            likes: Vec::new(),
            comments: Vec::new(),
            bookmarks: Vec::new(),
        }
    }

    pub fn liked_by(&self, uid: &str) -> bool {
        self.likes.iter().any(|like| like.uid == uid)
    }

    pub fn bookmarked_by(&self, uid: &str) -> bool {
        self.bookmarks.iter().any(|bookmark| bookmark == uid)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.created_at)
    }
}

/// Presence node `users/{uid}` in the realtime store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_online: Option<i64>,
}
