//! Logging and span export for the navigator process.
//!
//! [`init_tracing`] installs the global subscriber: an env filter, a console
//! formatter and, when a collector is configured, an OTLP/HTTP span layer.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter, `info` when unset. |
//! | `WAYFIND_LOG_FORMAT=json` | One JSON object per log line. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector URL; spans are exported only when non-empty. |
//!
//! ```rust,no_run
//! let _guard = wayfind_runtime::telemetry::init_tracing("wayfind");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

// ────────────────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────────────────

/// Install the global subscriber for `service_name`.
///
/// Route opens and reloads carry `#[instrument]` spans, so they reach the
/// collector when one is configured.  Keep the returned guard alive until
/// exit.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = if log_format_is_json() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    let provider = collector_endpoint(std::env::var(ENDPOINT_VAR).ok())
        .and_then(|endpoint| span_provider(service_name, endpoint));
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("wayfind")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(fmt_layer)
        .init();

    TracerProviderGuard(provider)
}

// ────────────────────────────────────────────────────────────────────────────
// RAII guard
// ────────────────────────────────────────────────────────────────────────────

/// Flushes exported spans when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` if spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("wayfind: span exporter did not shut down cleanly: {e}");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn log_format_is_json() -> bool {
    std::env::var("WAYFIND_LOG_FORMAT").as_deref() == Ok("json")
}

/// A blank endpoint counts as unset.
fn collector_endpoint(raw: Option<String>) -> Option<String> {
    raw.map(|e| e.trim().to_string()).filter(|e| !e.is_empty())
}

/// Span pipeline for `endpoint`.  An exporter that fails to build is
/// reported on stderr, since the subscriber is not up yet, and disables
/// export.
fn span_provider(service_name: &str, endpoint: String) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("wayfind: span export disabled: {e}");
            return None;
        }
    };

    // Route tasks run on plain threads, so export synchronously.
    let provider = SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .with_simple_exporter(exporter)
        .build();
    Some(provider)
}
