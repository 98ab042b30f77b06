use std::{process, sync::Arc};

use chirp::{
    application::{
        auth::AuthGate,
        error::{AppError, ErrorReport},
        navigation::sidebar,
        submission::{SubmissionController, SubmissionSite},
    },
    cache::{CacheConfig, CacheEntry, CacheTrigger, EntryStatus, ResourceCache, ResourceKey},
    config::{self, Command, Settings},
    domain::{identity::IdentityContext, resources::Resource},
    infra::{http::HttpClient, telemetry},
    presentation::terminal::{TerminalAuthPrompt, TerminalNotifier, entry_json, print_json},
};
use serde_json::json;
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(i32::from(error.exit_code()));
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("chirp::main", error);
    if dispatcher::has_been_set() {
        error!(source = report.source, error = %report.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, error = %report.chain(), "application error");
    });
}

/// Everything a command needs, wired once.
struct App {
    settings: Settings,
    http: Arc<HttpClient>,
    cache: ResourceCache<Resource>,
    trigger: CacheTrigger<Resource>,
    gate: AuthGate,
}

impl App {
    fn build(settings: Settings) -> Result<Self, AppError> {
        let identity = IdentityContext::new(settings.session.identity.clone());
        let http = Arc::new(HttpClient::new(&settings.api)?);
        let cache = ResourceCache::new(
            CacheConfig::from(&settings.cache),
            http.clone(),
            identity.clone(),
        );
        let trigger = CacheTrigger::new(cache.clone());
        let gate = AuthGate::new(identity, Arc::new(TerminalAuthPrompt));

        Ok(Self {
            settings,
            http,
            cache,
            trigger,
            gate,
        })
    }

    /// Load `key` and fail when nothing usable came back.
    async fn require(&self, key: &ResourceKey) -> Result<CacheEntry<Resource>, AppError> {
        let entry = self.cache.load(key).await;
        match (&entry.status, &entry.last_error) {
            (EntryStatus::Errored, Some(error)) if !entry.has_value() => {
                Err(AppError::fetch(key, error.clone()))
            }
            _ => Ok(entry),
        }
    }
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let app = App::build(settings)?;
    let identity_watch = app.trigger.spawn_identity_watch();

    let result = match cli_args.command {
        Command::Feed(args) => {
            let key = args
                .user_id
                .map_or(ResourceKey::PostList, ResourceKey::user_posts);
            show(&app, &key).await
        }
        Command::Show(args) => show(&app, &ResourceKey::post(args.post_id)).await,
        Command::Whoami => whoami(&app).await,
        Command::Post(args) => submit(&app, SubmissionSite::post(), args.body).await,
        Command::Comment(args) => {
            submit(&app, SubmissionSite::comment(args.post_id), args.body).await
        }
    };

    identity_watch.abort();
    result
}

async fn show(app: &App, key: &ResourceKey) -> Result<(), AppError> {
    let entry = app.require(key).await?;
    print(&entry_json(&entry))
}

async fn whoami(app: &App) -> Result<(), AppError> {
    let entry = app.require(&ResourceKey::CurrentUser).await?;
    let user = entry.value().and_then(Resource::current_user);

    let has_notification = user.is_some_and(|user| user.has_notification);
    let nav: Vec<_> = sidebar(user.map(|user| user.id.as_str()), has_notification)
        .into_iter()
        .map(|item| json!({ "label": item.label, "href": item.href, "alert": item.alert }))
        .collect();

    print(&json!({
        "signed_in": user.is_some(),
        "user": user,
        "sidebar": nav,
    }))
}

async fn submit(app: &App, site: SubmissionSite, body: String) -> Result<(), AppError> {
    let subscriptions: Vec<_> = site
        .invalidates()
        .iter()
        .map(|key| {
            app.cache.subscribe(key, |entry| {
                debug!(key = %entry.key, version = entry.version, status = %entry.status, "Entry updated");
            })
        })
        .collect();

    let controller = SubmissionController::new(
        site,
        app.settings.submission.clone(),
        app.gate.clone(),
        app.http.clone(),
        Arc::new(TerminalNotifier),
        app.trigger.clone(),
    );
    controller.set_draft(body)?;
    controller.submit().await?;

    let mut refreshed = Vec::with_capacity(subscriptions.len());
    for subscription in &subscriptions {
        let entry = app.cache.load(subscription.key()).await;
        info!(key = %entry.key, version = entry.version, "Refreshed after write");
        refreshed.push(entry_json(&entry));
    }
    drop(subscriptions);

    print(&json!({ "refreshed": refreshed }))
}

fn print<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    print_json(value).map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))
}
