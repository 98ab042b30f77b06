//! Sidebar navigation items gated by authentication.

use tracing::debug;

use super::auth::{AuthGate, GateOutcome};

/// Router boundary.
pub trait Navigator: Send + Sync {
    fn push(&self, href: &str);
}

/// What activating a [`NavItem`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// The explicit click handler ran.
    Clicked,
    /// Authentication was requested.
    AuthRequired,
    /// The navigator was sent to this href.
    Navigated(String),
    /// No handler and no href.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub label: String,
    pub href: Option<String>,
    pub requires_auth: bool,
    /// Show the unread-notification marker.
    pub alert: bool,
}

impl NavItem {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: Some(href.into()),
            requires_auth: false,
            alert: false,
        }
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn with_alert(mut self, alert: bool) -> Self {
        self.alert = alert;
        self
    }

    /// Handle a click.
    ///
    /// `on_click` wins over everything else. An item that requires auth goes
    /// through the gate's prompt when nobody is signed in.
    pub fn activate(
        &self,
        gate: &AuthGate,
        navigator: &dyn Navigator,
        on_click: Option<&dyn Fn()>,
    ) -> NavOutcome {
        if let Some(on_click) = on_click {
            on_click();
            return NavOutcome::Clicked;
        }

        if self.requires_auth && gate.require(|_| ()) == GateOutcome::AuthRequired {
            debug!(label = %self.label, "Navigation blocked: authentication required");
            return NavOutcome::AuthRequired;
        }

        match self.href.as_deref() {
            Some(href) => {
                navigator.push(href);
                NavOutcome::Navigated(href.to_string())
            }
            None => NavOutcome::Ignored,
        }
    }
}

/// The standard sidebar: home, notifications and the signed-in profile.
pub fn sidebar(profile_user_id: Option<&str>, has_notification: bool) -> Vec<NavItem> {
    let mut items = vec![
        NavItem::new("Home", "/"),
        NavItem::new("Notifications", "/notifications")
            .requiring_auth()
            .with_alert(has_notification),
    ];
    let profile_href = profile_user_id.map_or_else(|| "/users".to_string(), |id| format!("/users/{id}"));
    items.push(NavItem::new("Profile", profile_href).requiring_auth());
    items
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::application::auth::tests::CountingPrompt;
    use crate::domain::identity::{Identity, IdentityContext};

    #[derive(Default)]
    struct RecordingNavigator {
        pushed: Mutex<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn push(&self, href: &str) {
            self.pushed.lock().expect("pushed lock").push(href.to_string());
        }
    }

    fn signed_in() -> IdentityContext {
        IdentityContext::new(Some(
            Identity::new("u1", "wren", "token-1").expect("valid identity"),
        ))
    }

    #[test]
    fn explicit_click_handler_wins() {
        let gate = AuthGate::new(IdentityContext::anonymous(), Arc::new(CountingPrompt::default()));
        let navigator = RecordingNavigator::default();
        let clicked = Mutex::new(0);
        let on_click = || *clicked.lock().expect("clicked lock") += 1;

        let item = NavItem::new("Logout", "/").requiring_auth();
        let outcome = item.activate(&gate, &navigator, Some(&on_click));

        assert_eq!(outcome, NavOutcome::Clicked);
        assert_eq!(*clicked.lock().expect("clicked lock"), 1);
        assert!(navigator.pushed.lock().expect("pushed lock").is_empty());
    }

    #[test]
    fn anonymous_user_is_prompted_instead_of_navigating() {
        let prompt = Arc::new(CountingPrompt::default());
        let gate = AuthGate::new(IdentityContext::anonymous(), prompt.clone());
        let navigator = RecordingNavigator::default();

        let item = NavItem::new("Notifications", "/notifications").requiring_auth();
        let outcome = item.activate(&gate, &navigator, None);

        assert_eq!(outcome, NavOutcome::AuthRequired);
        assert_eq!(prompt.calls(), 1);
        assert!(navigator.pushed.lock().expect("pushed lock").is_empty());
    }

    #[test]
    fn signed_in_user_navigates() {
        let prompt = Arc::new(CountingPrompt::default());
        let gate = AuthGate::new(signed_in(), prompt.clone());
        let navigator = RecordingNavigator::default();

        let item = NavItem::new("Notifications", "/notifications").requiring_auth();
        let outcome = item.activate(&gate, &navigator, None);

        assert_eq!(outcome, NavOutcome::Navigated("/notifications".to_string()));
        assert_eq!(
            *navigator.pushed.lock().expect("pushed lock"),
            vec!["/notifications".to_string()]
        );
        assert_eq!(prompt.calls(), 0);
    }

    #[test]
    fn public_item_navigates_without_identity() {
        let gate = AuthGate::new(IdentityContext::anonymous(), Arc::new(CountingPrompt::default()));
        let navigator = RecordingNavigator::default();

        let outcome = NavItem::new("Home", "/").activate(&gate, &navigator, None);

        assert_eq!(outcome, NavOutcome::Navigated("/".to_string()));
    }

    #[test]
    fn item_without_href_does_nothing() {
        let gate = AuthGate::new(signed_in(), Arc::new(CountingPrompt::default()));
        let navigator = RecordingNavigator::default();
        let item = NavItem {
            label: "Spacer".to_string(),
            href: None,
            requires_auth: false,
            alert: false,
        };

        assert_eq!(item.activate(&gate, &navigator, None), NavOutcome::Ignored);
    }

    #[test]
    fn sidebar_links_profile_and_flags_notifications() {
        let items = sidebar(Some("u1"), true);

        assert_eq!(items.len(), 3);
        assert_eq!(items[1].label, "Notifications");
        assert!(items[1].alert && items[1].requires_auth);
        assert_eq!(items[2].href.as_deref(), Some("/users/u1"));
        assert!(!items[0].requires_auth);
    }
}
