use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "chirp_cache_fetch_total",
            Unit::Count,
            "Total number of applied fetch results, labelled by outcome."
        );
        describe_counter!(
            "chirp_cache_coalesced_total",
            Unit::Count,
            "Total number of reads that joined a fetch already in flight."
        );
        describe_counter!(
            "chirp_cache_discarded_total",
            Unit::Count,
            "Total number of fetch results dropped because a newer one had landed."
        );
        describe_histogram!(
            "chirp_cache_fetch_ms",
            Unit::Milliseconds,
            "Fetch latency in milliseconds."
        );
        describe_counter!(
            "chirp_submission_total",
            Unit::Count,
            "Total number of submit attempts, labelled by outcome."
        );
    });
}
