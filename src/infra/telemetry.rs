use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::rebuild::{METRIC_REBUILD_MS, METRIC_REBUILD_TOTAL};
use crate::application::revalidate::METRIC_REVALIDATE_TOTAL;
use crate::cache::{METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_WRITE};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of page cache hits, labelled by store."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of page cache misses, labelled by store."
        );
        describe_counter!(
            METRIC_CACHE_WRITE,
            Unit::Count,
            "Total number of page cache writes, labelled by store and operation."
        );
        describe_counter!(
            METRIC_REBUILD_TOTAL,
            Unit::Count,
            "Total number of rebuild attempts, labelled by outcome."
        );
        describe_histogram!(
            METRIC_REBUILD_MS,
            Unit::Milliseconds,
            "Full-cache rebuild latency in milliseconds."
        );
        describe_counter!(
            METRIC_REVALIDATE_TOTAL,
            Unit::Count,
            "Total number of page requests, labelled by revalidation outcome."
        );
    });
}
