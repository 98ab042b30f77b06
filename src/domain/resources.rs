//! Values held by the resource cache.

use chirp_api_types::{PostRecord, UserRecord};
use serde::Serialize;

/// A server-derived value cached under a [`crate::cache::ResourceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    /// The signed-in user, or `None` when nobody is signed in.
    CurrentUser(Option<UserRecord>),
    User(UserRecord),
    Posts(Vec<PostRecord>),
    Post(PostRecord),
}

impl Resource {
    pub fn current_user(&self) -> Option<&UserRecord> {
        match self {
            Resource::CurrentUser(user) => user.as_ref(),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Resource::User(user) => Some(user),
            Resource::CurrentUser(user) => user.as_ref(),
            _ => None,
        }
    }

    pub fn posts(&self) -> Option<&[PostRecord]> {
        match self {
            Resource::Posts(posts) => Some(posts),
            _ => None,
        }
    }

    pub fn post(&self) -> Option<&PostRecord> {
        match self {
            Resource::Post(post) => Some(post),
            _ => None,
        }
    }
}
