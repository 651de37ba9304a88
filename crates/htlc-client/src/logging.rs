use std::str::FromStr;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::SpanExporter,
};
use tracing::subscriber::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    Layer, Registry,
    layer::{Filter, SubscriberExt},
};

/// Configures [`setup_tracing`] to enable or disable the open-telemetry exporter.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// OpenTelemetry configuration
    pub otel: OpenTelemetry,
    /// Export data JSON-formatted
    pub json_format: bool,
    /// Service name attached to exported spans
    pub service_name: String,
}

/// OpenTelemetry configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenTelemetry {
    /// Enable OpenTelemetry export
    Enabled {
        /// Endpoint
        endpoint: String,
    },
    /// Disable OpenTelemetry
    Disabled,
}

impl TracingConfig {
    /// Tracing configuration constructor using environment variables
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let otel = if env_flag("OTEL_ENABLED") {
            OpenTelemetry::Enabled {
                endpoint: std::env::var("OTEL_TRACES_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            }
        } else {
            OpenTelemetry::Disabled
        };

        TracingConfig {
            otel,
            json_format: env_flag("JSON_LOGGING"),
            service_name: service_name.into(),
        }
    }
}

impl OpenTelemetry {
    /// Is OpenTelemetry enabled
    pub fn is_enabled(&self) -> bool {
        matches!(self, OpenTelemetry::Enabled { .. })
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(false)
}

/// Initializes tracing to stdout and optionally an open-telemetry exporter.
///
/// Trace filtering defaults to `INFO` and can be configured using the conventional `RUST_LOG`
/// environment variable.
///
/// Must be called from within a tokio runtime when OpenTelemetry is enabled.
pub fn setup_tracing(cfg: TracingConfig) -> Result<()> {
    if cfg.otel.is_enabled() {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

        setup_metrics_export(&cfg.otel)?;
    }

    // Lazily evaluated: open-telemetry requires a tokio-runtime, sync callers run with
    // `OpenTelemetry::Disabled`.
    let otel_layer = if let OpenTelemetry::Enabled { endpoint } = &cfg.otel {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint.clone())
            .build()
            .context("failed to build OTLP span exporter")?;
        Some(open_telemetry_layer(exporter, cfg.service_name.clone()))
    } else {
        None
    };

    let subscriber = Registry::default()
        .with(stdout_layer(cfg.json_format).with_filter(env_or_default_filter()?))
        .with(otel_layer.with_filter(env_or_default_filter()?));

    tracing::subscriber::set_global_default(subscriber).map_err(Into::into)
}

/// Setup OpenTelemetry metrics export
fn setup_metrics_export(otel_cfg: &OpenTelemetry) -> Result<()> {
    if let OpenTelemetry::Enabled { endpoint } = otel_cfg {
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = SdkMeterProvider::builder()
            .with_reader(
                PeriodicReader::builder(exporter)
                    .with_interval(std::time::Duration::from_secs(5))
                    .build(),
            )
            .build();

        opentelemetry::global::set_meter_provider(provider);
    }

    Ok(())
}

fn open_telemetry_layer<S>(
    exporter: impl SpanExporter + 'static,
    service_name: String,
) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + Sync + Send,
    for<'a> S: tracing_subscriber::registry::LookupSpan<'a>,
{
    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    let tracer = provider.tracer(service_name);

    opentelemetry::global::set_tracer_provider(provider);

    OpenTelemetryLayer::new(tracer).boxed()
}

fn stdout_layer<S>(
    json_logging: bool,
) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync + 'static>
where
    S: Subscriber,
    for<'a> S: tracing_subscriber::registry::LookupSpan<'a>,
{
    if json_logging {
        tracing_subscriber::fmt::layer()
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .json()
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_level(true)
            .with_target(true)
            .boxed()
    }
}

/// Creates a filter from the `RUST_LOG` env var, defaulting to `INFO` if unset.
///
/// Connection-level chatter of the HTTP stack is kept at `WARN` unless `RUST_LOG` says otherwise.
fn env_or_default_filter<S>() -> Result<Box<dyn Filter<S> + Send + Sync + 'static>> {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{
        EnvFilter,
        filter::{FilterExt, Targets},
    };

    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(rust_log) => Ok(FilterExt::boxed(
            EnvFilter::from_str(&rust_log).context("RUST_LOG contains an invalid filter")?,
        )),
        Err(std::env::VarError::NotUnicode(_)) => anyhow::bail!("RUST_LOG contained non-unicode"),
        Err(std::env::VarError::NotPresent) => Ok(FilterExt::boxed(
            Targets::new()
                .with_default(LevelFilter::INFO)
                .with_target("hyper_util", LevelFilter::WARN)
                .with_target("reqwest", LevelFilter::WARN),
        )),
    }
}
