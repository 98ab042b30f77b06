//! Cache configuration.
//!
//! Read from the `[cache]` section of `chirp.toml`.

use serde::Deserialize;

/// Which entries are revalidated when the identity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityChangeScope {
    /// Only `current-user`.
    #[default]
    CurrentUser,
    /// Every known entry.
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Invalidate identity-scoped entries on sign-in and sign-out.
    pub revalidate_on_identity_change: bool,
    pub identity_change_scope: IdentityChangeScope,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            revalidate_on_identity_change: true,
            identity_change_scope: IdentityChangeScope::CurrentUser,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            revalidate_on_identity_change: settings.revalidate_on_identity_change,
            identity_change_scope: settings.identity_change_scope,
        }
    }
}
