use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chirp::application::auth::{AuthGate, AuthPrompt};
use chirp::application::error::WriteError;
use chirp::application::notify::{Notifier, Toast};
use chirp::application::submission::{SubmissionController, SubmissionSite, WriteRequest, Writer};
use chirp::cache::{CacheConfig, CacheTrigger, FetchError, Fetcher, ResourceCache, ResourceKey};
use chirp::config::SubmissionSettings;
use chirp::domain::identity::{Identity, IdentityContext};
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use serial_test::serial;

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

/// Metric names paired with their `outcome` label, if any.
fn observed() -> HashSet<(String, Option<String>)> {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| {
            let key = composite_key.key();
            let outcome = key
                .labels()
                .find(|label| label.key() == "outcome")
                .map(|label| label.value().to_string());
            (key.name().to_string(), outcome)
        })
        .collect()
}

struct Backend {
    fail: AtomicBool,
}

#[async_trait]
impl Fetcher<String> for Backend {
    async fn fetch(
        &self,
        key: &ResourceKey,
        _identity: Option<&Identity>,
    ) -> Result<String, FetchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Status { status: 503 });
        }
        Ok(key.to_string())
    }
}

#[async_trait]
impl Writer for Backend {
    async fn write(&self, _request: &WriteRequest, _identity: &Identity) -> Result<(), WriteError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WriteError::Rejected { status: 503 });
        }
        Ok(())
    }
}

struct Quiet;

impl Notifier for Quiet {
    fn notify(&self, _toast: Toast) {}
}

impl AuthPrompt for Quiet {
    fn require_auth(&self) {}
}

fn backend(fail: bool) -> Arc<Backend> {
    Arc::new(Backend {
        fail: AtomicBool::new(fail),
    })
}

#[tokio::test]
#[serial]
async fn fetches_emit_outcome_and_latency_metrics() {
    snapshotter();
    let cache = ResourceCache::<String>::new(
        CacheConfig::default(),
        backend(false),
        IdentityContext::anonymous(),
    );
    cache.load(&ResourceKey::PostList).await;

    let failing = ResourceCache::<String>::new(
        CacheConfig::default(),
        backend(true),
        IdentityContext::anonymous(),
    );
    failing.load(&ResourceKey::PostList).await;

    let seen = observed();
    assert!(seen.contains(&("chirp_cache_fetch_total".to_string(), Some("ok".to_string()))));
    assert!(seen.contains(&(
        "chirp_cache_fetch_total".to_string(),
        Some("error".to_string())
    )));
    assert!(seen.contains(&("chirp_cache_fetch_ms".to_string(), None)));
}

#[tokio::test]
#[serial]
async fn submissions_are_counted_by_outcome() {
    snapshotter();
    let identity = IdentityContext::new(Some(
        Identity::new("u1", "wren", "token-1").expect("valid identity"),
    ));

    for fail in [false, true] {
        let backend = backend(fail);
        let cache =
            ResourceCache::<String>::new(CacheConfig::default(), backend.clone(), identity.clone());
        let controller = SubmissionController::new(
            SubmissionSite::post(),
            SubmissionSettings::default(),
            AuthGate::new(identity.clone(), Arc::new(Quiet)),
            backend,
            Arc::new(Quiet),
            CacheTrigger::new(cache),
        );
        controller.set_draft("counted").expect("draft fits");
        let _ = controller.submit().await;
    }

    let seen = observed();
    assert!(seen.contains(&(
        "chirp_submission_total".to_string(),
        Some("ok".to_string())
    )));
    assert!(seen.contains(&(
        "chirp_submission_total".to_string(),
        Some("write_failed".to_string())
    )));
}
