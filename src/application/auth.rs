//! Authentication gate for identity-requiring actions.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::domain::identity::{Identity, IdentityContext};

/// Asks the user to sign in (the login modal in a UI).
pub trait AuthPrompt: Send + Sync {
    fn require_auth(&self);
}

/// Result of passing an action through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<R> {
    /// An identity was present and the action ran.
    Proceeded(R),
    /// No identity; authentication was requested instead.
    AuthRequired,
}

impl<R> GateOutcome<R> {
    pub fn is_proceeded(&self) -> bool {
        matches!(self, GateOutcome::Proceeded(_))
    }

    pub fn into_option(self) -> Option<R> {
        match self {
            GateOutcome::Proceeded(value) => Some(value),
            GateOutcome::AuthRequired => None,
        }
    }
}

/// Run `action` when `identity` is present, otherwise `on_require_auth`.
///
/// Exactly one of the two closures runs, once.
pub fn guard<R>(
    identity: Option<&Identity>,
    action: impl FnOnce(&Identity) -> R,
    on_require_auth: impl FnOnce(),
) -> GateOutcome<R> {
    match identity {
        Some(identity) => GateOutcome::Proceeded(action(identity)),
        None => {
            on_require_auth();
            GateOutcome::AuthRequired
        }
    }
}

/// Decides whether an action proceeds or authentication is requested.
///
/// The identity is read at call time; the gate never changes it.
#[derive(Clone)]
pub struct AuthGate {
    identity: IdentityContext,
    prompt: Arc<dyn AuthPrompt>,
}

impl AuthGate {
    pub fn new(identity: IdentityContext, prompt: Arc<dyn AuthPrompt>) -> Self {
        Self { identity, prompt }
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_authenticated()
    }

    pub fn guard<R>(
        &self,
        action: impl FnOnce(&Identity) -> R,
        on_require_auth: impl FnOnce(),
    ) -> GateOutcome<R> {
        let current = self.identity.current();
        let outcome = guard(current.as_deref(), action, on_require_auth);
        if !outcome.is_proceeded() {
            debug!("Action blocked: authentication required");
        }
        outcome
    }

    /// [`guard`](Self::guard) with the configured prompt as fallback.
    pub fn require<R>(&self, action: impl FnOnce(&Identity) -> R) -> GateOutcome<R> {
        self.guard(action, || self.prompt.require_auth())
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
