use std::fmt;
use std::sync::Weak;

use super::keys::ResourceKey;

pub(crate) type SubscriberId = u64;

/// Something subscriptions can deregister from.
pub(crate) trait SubscriberRegistry: Send + Sync {
    fn remove_subscriber(&self, key: &ResourceKey, id: SubscriberId);
}

/// Disposer returned by [`super::ResourceCache::subscribe`].
///
/// The callback stays registered exactly as long as this value lives.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    key: ResourceKey,
    id: SubscriberId,
    registry: Option<Weak<dyn SubscriberRegistry>>,
}

impl Subscription {
    pub(crate) fn new(
        key: ResourceKey,
        id: SubscriberId,
        registry: Weak<dyn SubscriberRegistry>,
    ) -> Self {
        Self {
            key,
            id,
            registry: Some(registry),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Deregister the callback now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.remove_subscriber(&self.key, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
