//! Cache key definitions.
//!
//! A `ResourceKey` names one server-derived resource. Two keys are the same
//! resource exactly when they compare equal.

use std::fmt;

use crate::domain::types::{PostId, UserId};

/// Identifies a cacheable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// The signed-in user (derived from the current identity).
    CurrentUser,
    /// The global post feed.
    PostList,
    /// Posts authored by one user.
    UserPosts(UserId),
    /// A single post with its comments.
    Post(PostId),
    /// A user profile.
    User(UserId),
}

impl ResourceKey {
    pub fn post(id: impl Into<PostId>) -> Self {
        Self::Post(id.into())
    }

    pub fn user(id: impl Into<UserId>) -> Self {
        Self::User(id.into())
    }

    pub fn user_posts(id: impl Into<UserId>) -> Self {
        Self::UserPosts(id.into())
    }

    /// Whether the resource depends on who is signed in.
    pub fn is_identity_scoped(&self) -> bool {
        matches!(self, Self::CurrentUser)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentUser => f.write_str("current-user"),
            Self::PostList => f.write_str("post-list"),
            Self::UserPosts(id) => write!(f, "user-posts:{id}"),
            Self::Post(id) => write!(f, "post:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}
