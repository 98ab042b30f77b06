//! The authenticated principal and the context object that owns it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::error::DomainError;
use super::types::UserId;

/// The current authenticated principal.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: UserId,
    username: String,
    token: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<UserId>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let user_id = user_id.into();
        let username = username.into();
        let token = token.into();

        if user_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("identity user id must not be empty"));
        }
        if token.trim().is_empty() {
            return Err(DomainError::validation("identity token must not be empty"));
        }

        Ok(Self {
            user_id,
            username,
            token,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Process-wide holder of the current [`Identity`].
///
/// Cloning yields another handle to the same slot. Readers always see either
/// the previous or the next identity, never a mix: replacement swaps one `Arc`.
#[derive(Clone)]
pub struct IdentityContext {
    slot: Arc<watch::Sender<Option<Arc<Identity>>>>,
}

impl IdentityContext {
    pub fn new(initial: Option<Identity>) -> Self {
        let (slot, _) = watch::channel(initial.map(Arc::new));
        Self {
            slot: Arc::new(slot),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    /// Read the identity as of now.
    pub fn current(&self) -> Option<Arc<Identity>> {
        self.slot.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Install `identity` after a successful authentication.
    pub fn sign_in(&self, identity: Identity) {
        info!(user_id = %identity.user_id(), "Identity established");
        self.slot.send_replace(Some(Arc::new(identity)));
    }

    /// Clear the identity (logout or session expiry), returning the old one.
    pub fn sign_out(&self) -> Option<Arc<Identity>> {
        let previous = self.slot.send_replace(None);
        if let Some(identity) = previous.as_ref() {
            info!(user_id = %identity.user_id(), "Identity cleared");
        }
        previous
    }

    /// Receive a notification every time the identity is replaced.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Identity>>> {
        self.slot.subscribe()
    }
}

impl Default for IdentityContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("current", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wren() -> Identity {
        Identity::new("u1", "wren", "secret-token").expect("valid identity")
    }

    #[test]
    fn identity_rejects_blank_token() {
        let err = Identity::new("u1", "wren", "  ").expect_err("blank token rejected");
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[test]
    fn debug_output_redacts_token() {
        let rendered = format!("{:?}", wren());
        assert!(rendered.contains("wren"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn sign_in_and_out_replace_the_slot() {
        let context = IdentityContext::anonymous();
        assert!(context.current().is_none());

        context.sign_in(wren());
        let current = context.current().expect("identity after sign in");
        assert_eq!(current.username(), "wren");

        let previous = context.sign_out().expect("previous identity");
        assert_eq!(previous.user_id().as_str(), "u1");
        assert!(!context.is_authenticated());
    }

    #[test]
    fn clones_share_the_same_slot() {
        let context = IdentityContext::anonymous();
        let other = context.clone();
        other.sign_in(wren());
        assert!(context.is_authenticated());
    }

    #[tokio::test]
    async fn subscribers_observe_replacements() {
        let context = IdentityContext::anonymous();
        let mut rx = context.subscribe();

        context.sign_in(wren());
        rx.changed().await.expect("sender alive");
        assert!(rx.borrow_and_update().is_some());
    }
}
