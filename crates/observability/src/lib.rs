pub mod metrics;
mod redact;
mod serve;

pub use serve::serve_metrics;

use appconfig::Settings;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::runtime::Tokio;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Initializes the global tracing subscriber: env-filtered, redacting
/// layer for stdout, and (if `ENABLE_TRACING` is set) an OTLP exporter.
/// Call once at process startup, before spawning any workers.
pub fn init_tracing(settings: &Settings) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let subscriber = Registry::default()
        .with(filter)
        .with(redact::RedactingLayer);

    if settings.tracing.enable_tracing {
        let endpoint = settings
            .tracing
            .otel_exporter_otlp_endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ENABLE_TRACING set without OTEL_EXPORTER_OTLP_ENDPOINT"))?;

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint);

        let provider = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .install_batch(Tokio)?;

        let tracer = provider.tracer("mailhook");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        subscriber.with(otel_layer).try_init()?;
    } else {
        subscriber.try_init()?;
    }

    metrics::init();
    Ok(())
}
