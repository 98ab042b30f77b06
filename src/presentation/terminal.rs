//! stdout/stderr collaborators: toasts, the sign-in prompt and JSON output.

use serde::Serialize;
use serde_json::{Value, json};

use crate::application::auth::AuthPrompt;
use crate::application::notify::{Notifier, Toast, ToastKind};
use crate::cache::CacheEntry;
use crate::domain::resources::Resource;

pub const SIGN_IN_HINT: &str =
    "Sign in first: pass --token and --session-user-id, or set [session] in chirp.toml.";

pub fn toast_line(toast: &Toast) -> String {
    let marker = match toast.kind {
        ToastKind::Success => "✓",
        ToastKind::Error => "✗",
    };
    format!("{marker} {}", toast.message)
}

/// Toasts go to stderr, next to the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, toast: Toast) {
        eprintln!("{}", toast_line(&toast));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalAuthPrompt;

impl AuthPrompt for TerminalAuthPrompt {
    fn require_auth(&self) {
        eprintln!("{SIGN_IN_HINT}");
    }
}

/// JSON view of an entry: key, status, version and the value (if any).
pub fn entry_json(entry: &CacheEntry<Resource>) -> Value {
    let mut view = json!({
        "key": entry.key.to_string(),
        "status": entry.status.as_str(),
        "version": entry.version,
        "value": entry.value(),
    });
    if let Some(error) = entry.last_error.as_ref() {
        view["error"] = Value::String(error.to_string());
    }
    view
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
