//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::IdentityChangeScope;
use crate::domain::identity::Identity;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "chirp";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_SUCCESS_MESSAGE: &str = "Tweet created";
pub(crate) const DEFAULT_FAILURE_MESSAGE: &str = "Something went wrong";

/// Command-line arguments for the chirp binary.
#[derive(Debug, Parser)]
#[command(name = "chirp", version, about = "Terminal client for the chirp feed")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CHIRP_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the post feed.
    Feed(FeedArgs),
    /// Print one post with its comments.
    Show(ShowArgs),
    /// Print the signed-in user.
    Whoami,
    /// Publish a new post.
    Post(PostArgs),
    /// Comment on a post.
    Comment(CommentArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    /// Only show posts by this user.
    #[arg(long = "user-id", value_name = "ID")]
    pub user_id: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    #[arg(value_name = "POST_ID")]
    pub post_id: String,
}

#[derive(Debug, Args, Clone)]
pub struct PostArgs {
    #[arg(value_name = "BODY")]
    pub body: String,
}

#[derive(Debug, Args, Clone)]
pub struct CommentArgs {
    /// Post to comment on.
    #[arg(long = "post-id", value_name = "ID")]
    pub post_id: String,

    #[arg(value_name = "BODY")]
    pub body: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the API base URL.
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Session token to authenticate with.
    #[arg(long = "token", env = "CHIRP_TOKEN", value_name = "TOKEN", global = true)]
    pub token: Option<String>,

    /// User id the session token belongs to.
    #[arg(long = "session-user-id", value_name = "ID", global = true)]
    pub session_user_id: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved client settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub submission: SubmissionSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub revalidate_on_identity_change: bool,
    pub identity_change_scope: IdentityChangeScope,
}

#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    pub max_body_chars: NonZeroUsize,
    pub success_message: String,
    pub failure_message: String,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            max_body_chars: NonZeroUsize::new(crate::domain::posts::DEFAULT_MAX_BODY_CHARS)
                .unwrap_or(NonZeroUsize::MIN),
            success_message: DEFAULT_SUCCESS_MESSAGE.to_string(),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Identity established at start-up, if any.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub identity: Option<Identity>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CHIRP").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    submission: RawSubmissionSettings,
    session: RawSessionSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.api_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.api_timeout_seconds {
            self.api.request_timeout_seconds = Some(seconds);
        }
        if let Some(token) = overrides.token.as_ref() {
            self.session.token = Some(token.clone());
        }
        if let Some(user_id) = overrides.session_user_id.as_ref() {
            self.session.user_id = Some(user_id.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            logging,
            cache,
            submission,
            session,
        } = raw;

        let api = build_api_settings(api)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let submission = build_submission_settings(submission)?;
        let session = build_session_settings(session)?;

        Ok(Self {
            api,
            logging,
            cache,
            submission,
            session,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_url = api
        .base_url
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("api.base_url", format!("invalid url: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api.base_url",
            format!("unsupported scheme `{}`", base_url.scheme()),
        ));
    }

    let timeout_secs = api
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "api.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ApiSettings {
        base_url,
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let identity_change_scope = match cache.identity_change_scope.as_deref().map(str::trim) {
        None | Some("current_user") => IdentityChangeScope::CurrentUser,
        Some("all") => IdentityChangeScope::All,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.identity_change_scope",
                format!("expected `current_user` or `all`, got `{other}`"),
            ));
        }
    };

    Ok(CacheSettings {
        revalidate_on_identity_change: cache.revalidate_on_identity_change.unwrap_or(true),
        identity_change_scope,
    })
}

fn build_submission_settings(
    submission: RawSubmissionSettings,
) -> Result<SubmissionSettings, LoadError> {
    let defaults = SubmissionSettings::default();

    let max_body_chars = match submission.max_body_chars {
        Some(value) => NonZeroUsize::new(value).ok_or_else(|| {
            LoadError::invalid("submission.max_body_chars", "must be greater than zero")
        })?,
        None => defaults.max_body_chars,
    };

    let success_message = non_blank(
        submission.success_message,
        defaults.success_message,
        "submission.success_message",
    )?;
    let failure_message = non_blank(
        submission.failure_message,
        defaults.failure_message,
        "submission.failure_message",
    )?;

    Ok(SubmissionSettings {
        max_body_chars,
        success_message,
        failure_message,
    })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let token = trimmed(session.token);
    let user_id = trimmed(session.user_id);

    let identity = match (token, user_id) {
        (None, None) => None,
        (Some(_), None) => {
            return Err(LoadError::invalid(
                "session.user_id",
                "required when a session token is configured",
            ));
        }
        (None, Some(_)) => {
            return Err(LoadError::invalid(
                "session.token",
                "required when a session user id is configured",
            ));
        }
        (Some(token), Some(user_id)) => {
            let username = trimmed(session.username).unwrap_or_else(|| user_id.clone());
            let identity = Identity::new(user_id, username, token)
                .map_err(|err| LoadError::invalid("session", err.to_string()))?;
            Some(identity)
        }
    };

    Ok(SessionSettings { identity })
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_blank(
    value: Option<String>,
    default: String,
    key: &'static str,
) -> Result<String, LoadError> {
    match value {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => {
            Err(LoadError::invalid(key, "must not be blank"))
        }
        Some(value) => Ok(value),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    revalidate_on_identity_change: Option<bool>,
    identity_change_scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSubmissionSettings {
    max_body_chars: Option<usize>,
    success_message: Option<String>,
    failure_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    token: Option<String>,
    user_id: Option<String>,
    username: Option<String>,
}
