//! Submission sites: one draft, one write at a time, cache refresh on success.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use metrics::counter;
use tracing::{Span, debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::{CacheTrigger, ResourceKey, mutex_lock};
use crate::config::SubmissionSettings;
use crate::domain::identity::Identity;
use crate::domain::posts;
use crate::domain::types::PostId;

use super::auth::{AuthGate, GateOutcome};
pub use super::error::WriteError;
use super::error::{DraftError, SubmissionError};
use super::notify::{Notifier, Toast};

const SOURCE: &str = "application::submission";
const METRIC_SUBMISSION_TOTAL: &str = "chirp_submission_total";

/// What a submission creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    Post,
    Comment { post_id: PostId },
}

impl fmt::Display for WriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteTarget::Post => f.write_str("post"),
            WriteTarget::Comment { post_id } => write!(f, "comment:{post_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub target: WriteTarget,
    pub body: String,
}

/// The write side of the network boundary.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, request: &WriteRequest, identity: &Identity) -> Result<(), WriteError>;
}

/// Where a submission goes and which entries it makes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSite {
    target: WriteTarget,
    invalidates: Vec<ResourceKey>,
}

impl SubmissionSite {
    /// New top-level post; refreshes the feed.
    pub fn post() -> Self {
        Self {
            target: WriteTarget::Post,
            invalidates: vec![ResourceKey::PostList],
        }
    }

    /// Comment on `post_id`; refreshes the feed and that post.
    pub fn comment(post_id: impl Into<PostId>) -> Self {
        let post_id = post_id.into();
        Self {
            invalidates: vec![ResourceKey::PostList, ResourceKey::Post(post_id.clone())],
            target: WriteTarget::Comment { post_id },
        }
    }

    /// Also refresh `key` after a successful write.
    pub fn also_invalidating(mut self, key: ResourceKey) -> Self {
        if !self.invalidates.contains(&key) {
            self.invalidates.push(key);
        }
        self
    }

    pub fn target(&self) -> &WriteTarget {
        &self.target
    }

    pub fn invalidates(&self) -> &[ResourceKey] {
        &self.invalidates
    }
}

/// Clears the in-flight flag however the submission ends, including when its
/// future is dropped mid-write.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owns the draft and the in-flight flag of one submission site.
pub struct SubmissionController<V> {
    site: SubmissionSite,
    settings: SubmissionSettings,
    draft: Mutex<String>,
    in_flight: AtomicBool,
    gate: AuthGate,
    writer: Arc<dyn Writer>,
    notifier: Arc<dyn Notifier>,
    trigger: CacheTrigger<V>,
}

impl<V: Send + Sync + 'static> SubmissionController<V> {
    pub fn new(
        site: SubmissionSite,
        settings: SubmissionSettings,
        gate: AuthGate,
        writer: Arc<dyn Writer>,
        notifier: Arc<dyn Notifier>,
        trigger: CacheTrigger<V>,
    ) -> Self {
        Self {
            site,
            settings,
            draft: Mutex::new(String::new()),
            in_flight: AtomicBool::new(false),
            gate,
            writer,
            notifier,
            trigger,
        }
    }

    pub fn site(&self) -> &SubmissionSite {
        &self.site
    }

    pub fn draft(&self) -> String {
        mutex_lock(&self.draft, SOURCE, "draft").clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the submit control should be enabled.
    pub fn can_submit(&self) -> bool {
        !self.is_in_flight() && !posts::is_blank(&mutex_lock(&self.draft, SOURCE, "can_submit"))
    }

    /// Replace the draft text.
    pub fn set_draft(&self, text: impl Into<String>) -> Result<(), DraftError> {
        let text = text.into();
        let mut draft = mutex_lock(&self.draft, SOURCE, "set_draft");

        if self.is_in_flight() {
            return Err(DraftError::Busy);
        }
        let max = self.settings.max_body_chars.get();
        if posts::validate_length(&text, max).is_err() {
            return Err(DraftError::TooLong {
                max,
                actual: text.chars().count(),
            });
        }

        *draft = text;
        Ok(())
    }

    /// Send the draft.
    ///
    /// Clears the draft and refreshes the site's entries only after the write
    /// succeeded; a failed write leaves the draft and the cache untouched.
    #[instrument(
        skip(self),
        fields(
            site = %self.site.target,
            submission_id = %Uuid::new_v4(),
            user_id = tracing::field::Empty
        )
    )]
    pub async fn submit(&self) -> Result<(), SubmissionError> {
        let result = self.run().await;
        let outcome = match &result {
            Ok(()) => "ok",
            Err(err) => err.as_str(),
        };
        counter!(METRIC_SUBMISSION_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn run(&self) -> Result<(), SubmissionError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Submission rejected: another one is in flight");
            return Err(SubmissionError::AlreadyInProgress);
        };

        let body = self.draft();
        if posts::is_blank(&body) {
            debug!("Submission rejected: empty draft");
            return Err(SubmissionError::EmptyDraft);
        }

        let identity = match self.gate.require(Identity::clone) {
            GateOutcome::Proceeded(identity) => identity,
            GateOutcome::AuthRequired => return Err(SubmissionError::Unauthenticated),
        };

        let request = WriteRequest {
            target: self.site.target.clone(),
            body,
        };
        Span::current().record("user_id", identity.user_id().as_str());

        match self.writer.write(&request, &identity).await {
            Ok(()) => {
                mutex_lock(&self.draft, SOURCE, "submit").clear();
                self.trigger.write_landed(self.site.invalidates());
                self.notifier
                    .notify(Toast::success(self.settings.success_message.clone()));
                info!(
                    user_id = %identity.user_id(),
                    chars = request.body.chars().count(),
                    "Submission completed"
                );
                Ok(())
            }
            Err(err) => {
                warn!(user_id = %identity.user_id(), error = %err, "Submission failed");
                self.notifier
                    .notify(Toast::error(self.settings.failure_message.clone()));
                Err(SubmissionError::WriteFailed(err))
            }
        }
    }
}

impl<V> fmt::Debug for SubmissionController<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionController")
            .field("site", &self.site)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::oneshot;

    use super::*;
    use crate::application::auth::tests::CountingPrompt;
    use crate::application::notify::ToastKind;
    use crate::cache::{CacheConfig, EntryStatus, FetchError, Fetcher, ResourceCache};
    use crate::domain::identity::IdentityContext;

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher<String> for CountingFetcher {
        async fn fetch(
            &self,
            key: &ResourceKey,
            _identity: Option<&Identity>,
        ) -> Result<String, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{key}#{call}"))
        }
    }

    /// Succeeds unless told otherwise; a scripted gate holds the write open.
    #[derive(Default)]
    struct ScriptedWriter {
        requests: Mutex<Vec<WriteRequest>>,
        results: Mutex<VecDeque<Result<(), WriteError>>>,
        gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    }

    impl ScriptedWriter {
        fn fail_next(&self, error: WriteError) {
            self.results.lock().expect("results lock").push_back(Err(error));
        }

        fn hold_next(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().expect("gates lock").push_back(rx);
            tx
        }

        fn requests(&self) -> Vec<WriteRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl Writer for ScriptedWriter {
        async fn write(
            &self,
            request: &WriteRequest,
            _identity: &Identity,
        ) -> Result<(), WriteError> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            let gate = self.gates.lock().expect("gates lock").pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.results
                .lock()
                .expect("results lock")
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        toasts: Mutex<Vec<Toast>>,
    }

    impl RecordingNotifier {
        fn toasts(&self) -> Vec<Toast> {
            self.toasts.lock().expect("toasts lock").clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, toast: Toast) {
            self.toasts.lock().expect("toasts lock").push(toast);
        }
    }

    struct Harness {
        cache: ResourceCache<String>,
        identity: IdentityContext,
        prompt: Arc<CountingPrompt>,
        writer: Arc<ScriptedWriter>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Harness {
        fn signed_in() -> Self {
            let identity = IdentityContext::new(Some(
                Identity::new("u1", "wren", "token-1").expect("valid identity"),
            ));
            Self::with_identity(identity)
        }

        fn with_identity(identity: IdentityContext) -> Self {
            let cache = ResourceCache::new(
                CacheConfig::default(),
                Arc::new(CountingFetcher::default()),
                identity.clone(),
            );
            Self {
                cache,
                identity,
                prompt: Arc::new(CountingPrompt::default()),
                writer: Arc::new(ScriptedWriter::default()),
                notifier: Arc::new(RecordingNotifier::default()),
            }
        }

        fn controller(&self, site: SubmissionSite) -> SubmissionController<String> {
            SubmissionController::new(
                site,
                SubmissionSettings::default(),
                AuthGate::new(self.identity.clone(), self.prompt.clone()),
                self.writer.clone(),
                self.notifier.clone(),
                CacheTrigger::new(self.cache.clone()),
            )
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn successful_post_clears_draft_refreshes_feed_and_toasts() {
        let harness = Harness::signed_in();
        let before = harness.cache.load(&ResourceKey::PostList).await;
        let versions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&versions);
        let _subscription = harness.cache.subscribe(&ResourceKey::PostList, move |entry| {
            sink.lock().expect("versions lock").push(entry.version);
        });

        let controller = harness.controller(SubmissionSite::post());
        controller.set_draft("hello").expect("draft accepted");
        controller.submit().await.expect("submission succeeds");

        assert_eq!(
            harness.writer.requests(),
            vec![WriteRequest {
                target: WriteTarget::Post,
                body: "hello".to_string(),
            }]
        );
        assert_eq!(controller.draft(), "");
        assert!(!controller.is_in_flight());
        assert_eq!(harness.notifier.toasts(), vec![Toast::success("Tweet created")]);

        let after = harness.cache.load(&ResourceKey::PostList).await;
        settle().await;
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.status, EntryStatus::Fresh);
        assert_eq!(*versions.lock().expect("versions lock"), vec![after.version]);
    }

    #[tokio::test]
    async fn successful_comment_invalidates_feed_and_post() {
        let harness = Harness::signed_in();
        harness.cache.load(&ResourceKey::PostList).await;
        harness.cache.load(&ResourceKey::post("123")).await;
        harness.cache.load(&ResourceKey::post("999")).await;

        let controller = harness.controller(SubmissionSite::comment("123"));
        controller.set_draft("nice").expect("draft accepted");
        controller.submit().await.expect("submission succeeds");

        assert_eq!(
            harness.writer.requests()[0].target,
            WriteTarget::Comment {
                post_id: PostId::new("123")
            }
        );
        let cache = &harness.cache;
        assert_eq!(cache.peek(&ResourceKey::PostList).status, EntryStatus::Stale);
        assert_eq!(cache.peek(&ResourceKey::post("123")).status, EntryStatus::Stale);
        assert_eq!(cache.peek(&ResourceKey::post("999")).status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn failed_write_keeps_draft_and_cache() {
        let harness = Harness::signed_in();
        let before = harness.cache.load(&ResourceKey::PostList).await;
        let _subscription = harness.cache.subscribe(&ResourceKey::PostList, |_| {});

        let controller = harness.controller(SubmissionSite::post());
        controller.set_draft("hello").expect("draft accepted");
        harness.writer.fail_next(WriteError::Rejected { status: 500 });

        let err = controller.submit().await.expect_err("write fails");
        settle().await;

        assert_eq!(
            err,
            SubmissionError::WriteFailed(WriteError::Rejected { status: 500 })
        );
        assert_eq!(controller.draft(), "hello");
        assert!(!controller.is_in_flight());
        let toasts = harness.notifier.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert_eq!(toasts[0].message, "Something went wrong");

        let after = harness.cache.peek(&ResourceKey::PostList);
        assert_eq!(after.version, before.version);
        assert_eq!(after.status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_does_not_write() {
        let harness = Harness::signed_in();
        let controller = Arc::new(harness.controller(SubmissionSite::post()));
        controller.set_draft("hello").expect("draft accepted");
        let release = harness.writer.hold_next();

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.submit().await }
        });
        settle().await;

        assert!(controller.is_in_flight());
        assert!(!controller.can_submit());
        assert_eq!(
            controller.submit().await,
            Err(SubmissionError::AlreadyInProgress)
        );
        assert_eq!(controller.set_draft("edited"), Err(DraftError::Busy));

        release.send(()).expect("write waiting");
        first
            .await
            .expect("task joins")
            .expect("first submission succeeds");

        assert_eq!(harness.writer.requests().len(), 1);
        assert_eq!(harness.writer.requests()[0].body, "hello");
        assert!(!controller.is_in_flight());
    }

    #[tokio::test]
    async fn blank_draft_is_rejected_without_writing() {
        let harness = Harness::signed_in();
        let controller = harness.controller(SubmissionSite::post());

        assert_eq!(controller.submit().await, Err(SubmissionError::EmptyDraft));
        controller.set_draft("   \n").expect("draft accepted");
        assert!(!controller.can_submit());
        assert_eq!(controller.submit().await, Err(SubmissionError::EmptyDraft));

        assert!(harness.writer.requests().is_empty());
        assert!(harness.notifier.toasts().is_empty());
        assert!(!controller.is_in_flight());
    }

    #[tokio::test]
    async fn anonymous_submit_prompts_and_keeps_draft() {
        let harness = Harness::with_identity(IdentityContext::anonymous());
        let controller = harness.controller(SubmissionSite::post());
        controller.set_draft("hello").expect("draft accepted");

        assert_eq!(
            controller.submit().await,
            Err(SubmissionError::Unauthenticated)
        );

        assert_eq!(harness.prompt.calls(), 1);
        assert!(harness.writer.requests().is_empty());
        assert_eq!(controller.draft(), "hello");
        assert!(!controller.is_in_flight());
    }

    #[tokio::test]
    async fn dropping_a_pending_submission_releases_the_flag() {
        let harness = Harness::signed_in();
        let controller = harness.controller(SubmissionSite::post());
        controller.set_draft("hello").expect("draft accepted");
        let _release = harness.writer.hold_next();

        {
            let pending = controller.submit();
            tokio::pin!(pending);
            assert!(futures::poll!(pending.as_mut()).is_pending());
            assert!(controller.is_in_flight());
        }

        assert!(!controller.is_in_flight());
        assert_eq!(controller.draft(), "hello");
        assert!(controller.can_submit());
    }

    #[tokio::test]
    async fn controller_is_reusable_after_each_outcome() {
        let harness = Harness::signed_in();
        let controller = harness.controller(SubmissionSite::post());

        controller.set_draft("one").expect("draft accepted");
        harness.writer.fail_next(WriteError::transport("offline"));
        assert!(controller.submit().await.is_err());
        controller.submit().await.expect("retry succeeds");
        controller.set_draft("two").expect("draft accepted");
        controller.submit().await.expect("second post succeeds");

        let bodies: Vec<String> = harness
            .writer
            .requests()
            .into_iter()
            .map(|request| request.body)
            .collect();
        assert_eq!(bodies, vec!["one", "one", "two"]);
    }

    #[tokio::test]
    async fn overlong_draft_is_rejected() {
        let harness = Harness::signed_in();
        let controller = harness.controller(SubmissionSite::post());
        let text = "é".repeat(281);

        assert_eq!(
            controller.set_draft(text),
            Err(DraftError::TooLong {
                max: 280,
                actual: 281
            })
        );
        controller
            .set_draft("é".repeat(280))
            .expect("limit counts characters");
    }

    #[tokio::test]
    async fn controllers_for_different_sites_write_concurrently() {
        let harness = Harness::signed_in();
        let post = Arc::new(harness.controller(SubmissionSite::post()));
        let comment = harness.controller(SubmissionSite::comment("123"));
        post.set_draft("post body").expect("draft accepted");
        comment.set_draft("comment body").expect("draft accepted");
        let release = harness.writer.hold_next();

        let pending = tokio::spawn({
            let post = Arc::clone(&post);
            async move { post.submit().await }
        });
        settle().await;
        assert!(post.is_in_flight());

        comment.submit().await.expect("comment is independent");
        release.send(()).expect("write waiting");
        pending
            .await
            .expect("task joins")
            .expect("post submission succeeds");

        assert_eq!(harness.writer.requests().len(), 2);
    }

    #[test]
    fn site_invalidation_sets_are_deduplicated() {
        let site = SubmissionSite::comment("123")
            .also_invalidating(ResourceKey::PostList)
            .also_invalidating(ResourceKey::user_posts("u1"));

        assert_eq!(
            site.invalidates(),
            &[
                ResourceKey::PostList,
                ResourceKey::post("123"),
                ResourceKey::user_posts("u1"),
            ]
        );
    }
}
