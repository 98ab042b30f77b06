//! Cache trigger service.
//!
//! Turns application events (a write landed, the identity changed) into cache
//! invalidations.

use tokio::task::JoinHandle;
use tracing::debug;

use super::config::{CacheConfig, IdentityChangeScope};
use super::keys::ResourceKey;
use super::store::ResourceCache;

/// Cache trigger for invalidating entries after events.
///
/// # Usage
///
/// ```ignore
/// // After a successful comment on post 42:
/// trigger.write_landed(&[ResourceKey::PostList, ResourceKey::post("42")]);
/// ```
pub struct CacheTrigger<V> {
    config: CacheConfig,
    cache: ResourceCache<V>,
}

impl<V> Clone for CacheTrigger<V> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<V: Send + Sync + 'static> CacheTrigger<V> {
    pub fn new(cache: ResourceCache<V>) -> Self {
        Self {
            config: cache.config().clone(),
            cache,
        }
    }

    pub fn cache(&self) -> &ResourceCache<V> {
        &self.cache
    }

    /// Invalidate the keys a successful write affected.
    pub fn write_landed(&self, keys: &[ResourceKey]) {
        debug!(keys = keys.len(), "Invalidating entries after write");
        self.cache.invalidate_many(keys);
    }

    /// Revalidate identity-scoped entries after sign-in or sign-out.
    pub fn identity_changed(&self) {
        if !self.config.revalidate_on_identity_change {
            debug!("Identity change ignored: revalidation disabled");
            return;
        }

        let keys: Vec<ResourceKey> = match self.config.identity_change_scope {
            IdentityChangeScope::CurrentUser => {
                let mut keys: Vec<ResourceKey> = self
                    .cache
                    .keys()
                    .into_iter()
                    .filter(ResourceKey::is_identity_scoped)
                    .collect();
                if keys.is_empty() {
                    keys.push(ResourceKey::CurrentUser);
                }
                keys
            }
            IdentityChangeScope::All => self.cache.keys(),
        };

        debug!(
            scope = ?self.config.identity_change_scope,
            keys = keys.len(),
            "Revalidating after identity change"
        );
        self.cache.invalidate_many(&keys);
    }

    /// Call [`identity_changed`](Self::identity_changed) on every identity
    /// replacement until the cache is dropped.
    pub fn spawn_identity_watch(&self) -> JoinHandle<()> {
        let mut changes = self.cache.identity().subscribe();
        let cache = self.cache.downgrade();

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                CacheTrigger::new(cache).identity_changed();
            }
            debug!("Identity watch stopped");
        })
    }
}
