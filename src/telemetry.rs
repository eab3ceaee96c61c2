//! Telemetry and logging infrastructure
//!
//! - Console logging (human-readable)
//! - JSON file logging, rotated daily
//! - OpenTelemetry export when an OTLP endpoint is configured

use crate::config::TelemetryConfig;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the rolling JSON log file inside the log directory
pub const LOG_FILE_PREFIX: &str = "capstack.log";

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug,hyper=info,reqwest=info,h2=info,rustls=info,tower_http=debug"
    } else {
        "info,hyper=warn,reqwest=warn,h2=warn,rustls=warn,tower_http=info"
    }
}

/// Keeps the log writers and the trace exporter alive.
///
/// Drop it last: dropping flushes the file writer and shuts the exporter down.
pub struct Telemetry {
    log_dir: Option<PathBuf>,
    _file_guard: Option<WorkerGuard>,
    otel_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Install the global subscriber
    pub fn init(config: &TelemetryConfig, service_name: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

        let make_env_filter = || {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(config.verbose)))
        };

        let otel_provider = if let Some(endpoint) = config.otel_endpoint.as_deref() {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                .build()?;

            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(
                    Resource::builder()
                        .with_service_name(service_name.to_string())
                        .build(),
                )
                .build();

            let tracer = provider.tracer("capstack");
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().with_target(false).compact())
                .with(fmt::layer().json().with_writer(non_blocking))
                .with(otel_layer)
                .try_init()
                .ok();
            Some(provider)
        } else {
            tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().with_target(false).compact())
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init()
                .ok();
            None
        };

        tracing::info!(
            service = service_name,
            log_dir = %config.log_dir.display(),
            otel_enabled = otel_provider.is_some(),
            "Telemetry initialized"
        );

        Ok(Self {
            log_dir: Some(config.log_dir.clone()),
            _file_guard: Some(file_guard),
            otel_provider,
        })
    }

    /// Console-only logging, for one-shot CLI commands and tests
    pub fn minimal(verbose: bool) -> Self {
        tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose))),
            )
            .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
            .try_init()
            .ok();

        Self {
            log_dir: None,
            _file_guard: None,
            otel_provider: None,
        }
    }

    /// Directory holding the JSON logs, if file logging is on
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    pub fn otel_enabled(&self) -> bool {
        self.otel_provider.is_some()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = self.otel_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shut down trace exporter: {e}");
            }
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("log_dir", &self.log_dir)
            .field("otel_enabled", &self.otel_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_http_stack() {
        assert!(default_filter(false).starts_with("info"));
        assert!(default_filter(false).contains("hyper=warn"));
        assert!(default_filter(true).starts_with("debug"));
    }

    #[test]
    fn test_init_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = TelemetryConfig {
            log_dir: dir.path().join("logs"),
            verbose: false,
            otel_endpoint: None,
        };

        let telemetry = Telemetry::init(&config, "capstack-test").unwrap();

        assert!(config.log_dir.is_dir());
        assert_eq!(telemetry.log_dir(), Some(config.log_dir.as_path()));
        assert!(!telemetry.otel_enabled());
    }

    #[test]
    fn test_minimal_has_no_file_output() {
        let telemetry = Telemetry::minimal(false);
        assert!(telemetry.log_dir().is_none());
    }
}
