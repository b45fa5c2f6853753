//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use stepwise_observe::tracing_setup::{TracingOptions, init_tracing};
//!
//! // Human-readable logs at `info`
//! init_tracing(&TracingOptions::default()).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::OnceLock;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// How the global subscriber should format and filter events.
#[derive(Debug, Clone)]
pub struct TracingOptions {
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
    /// Bridge spans to OpenTelemetry with a stdout exporter.
    pub otel: bool,
    /// Filter directive used when `RUST_LOG` is not set.
    pub default_filter: String,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            json: false,
            otel: false,
            default_filter: "info".to_string(),
        }
    }
}

impl TracingOptions {
    /// Map CLI verbosity flags to a filter directive.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let default_filter = match verbose {
            0 if quiet => "error",
            0 => "warn",
            1 => "info,stepwise=debug",
            _ => "trace",
        };
        Self {
            default_filter: default_filter.to_string(),
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Initialize the global tracing subscriber.
///
/// - Always installs a `fmt` layer, pretty or JSON per `options.json`.
/// - When `options.otel` is true, additionally bridges tracing spans to
///   OpenTelemetry using a stdout exporter.
/// - `RUST_LOG` takes precedence over `options.default_filter`.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(options: &TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = options.env_filter();

    let fmt_layer = if options.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .boxed()
    };

    let otel_layer = if options.otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("stepwise");

        // Store the provider for shutdown and register it globally.
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// Safe to call even when OTel was not enabled (no-op in that case).
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(TracingOptions::from_verbosity(0, true).default_filter, "error");
        assert_eq!(TracingOptions::from_verbosity(0, false).default_filter, "warn");
        assert_eq!(
            TracingOptions::from_verbosity(1, false).default_filter,
            "info,stepwise=debug"
        );
        assert_eq!(TracingOptions::from_verbosity(3, true).default_filter, "trace");
    }

    #[test]
    fn defaults_are_plain_text() {
        let options = TracingOptions::default();
        assert!(!options.json);
        assert!(!options.otel);
    }
}
