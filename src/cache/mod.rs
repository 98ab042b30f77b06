//! Client-side resource cache.
//!
//! Holds the last known value of every server-derived resource the client
//! has asked for, keyed by [`ResourceKey`]:
//!
//! - **Coalescing**: concurrent readers of one key share a single fetch.
//! - **Invalidation**: writes mark entries stale; watched entries refresh at
//!   once, unwatched ones on their next read.
//! - **Ordering**: results of superseded fetches never overwrite newer ones.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! revalidate_on_identity_change = true
//! identity_change_scope = "current_user"   # or "all"
//! ```

mod config;
mod entry;
mod fetcher;
mod keys;
mod lock;
mod store;
mod subscription;
mod trigger;

pub use config::{CacheConfig, IdentityChangeScope};
pub use entry::{CacheEntry, EntryStatus};
pub use fetcher::{FetchError, Fetcher};
pub use keys::ResourceKey;
pub(crate) use lock::mutex_lock;
pub use store::ResourceCache;
pub use subscription::Subscription;
pub use trigger::CacheTrigger;
