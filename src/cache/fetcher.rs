//! The read side of the network boundary.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::identity::Identity;

use super::keys::ResourceKey;

/// Why a fetch failed. Cloneable so that every waiter of a coalesced fetch
/// receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server responded with status {status}")]
    Status { status: u16 },
    #[error("response could not be decoded: {0}")]
    Decode(String),
    #[error("resource `{0}` is not served by this fetcher")]
    Unsupported(String),
}

impl FetchError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Loads the current value of a resource from its source of truth.
///
/// `identity` is the identity at the moment the fetch started.
#[async_trait]
pub trait Fetcher<V>: Send + Sync {
    async fn fetch(&self, key: &ResourceKey, identity: Option<&Identity>) -> Result<V, FetchError>;
}
