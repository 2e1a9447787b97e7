//! OpenTelemetry initialization for the gateway admin/worker process.
//!
//! Adapted directly from `holler::telemetry::init`: same OTLP gRPC trace +
//! log + metric exporter trio wired through `tracing_subscriber`, with
//! the service name and the `<crate>=debug` default directive changed to
//! `gateway`.

use anyhow::Context;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize OpenTelemetry with OTLP exporters for the long-running
/// `serve` process. CLI one-shot commands use [`init_plain`] instead.
pub fn init(otlp_endpoint: &str) -> anyhow::Result<()> {
    let resource = Resource::builder_empty()
        .with_service_name("gateway")
        .with_attributes(vec![
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", "production"),
        ])
        .build();

    let endpoint = if otlp_endpoint.starts_with("http") {
        otlp_endpoint.to_string()
    } else {
        format!("http://{otlp_endpoint}")
    };

    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()
        .context("failed to create OTLP span exporter")?;
    let batch_span_processor = opentelemetry_sdk::trace::BatchSpanProcessor::builder(trace_exporter).build();
    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_span_processor(batch_span_processor)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();
    let tracer = tracer_provider.tracer("gateway");
    global::set_tracer_provider(tracer_provider);

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()
        .context("failed to create OTLP log exporter")?;
    let log_processor = opentelemetry_sdk::logs::BatchLogProcessor::builder(log_exporter).build();
    let logger_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
        .with_log_processor(log_processor)
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to create OTLP metric exporter")?;
    let metric_reader = opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter).build();
    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(metric_reader)
        .with_resource(resource)
        .build();
    global::set_meter_provider(meter_provider);

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let log_appender = opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&logger_provider);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,gateway=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .with(log_appender)
        .init();

    tracing::info!(endpoint = %otlp_endpoint, "opentelemetry initialized");
    Ok(())
}

/// Plain stdout tracing for one-shot CLI commands that don't warrant an
/// OTLP collector round trip (spec section 9's ambient-stack note: every
/// command still gets structured logging, just not the full exporter
/// trio).
pub fn init_plain(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
