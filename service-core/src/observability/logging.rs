use crate::error::AppError;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, runtime, trace as sdktrace};
use std::sync::{Arc, RwLock};
use tracing_subscriber::{
    EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const SUPPORTED_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Runtime handle over the active log filter.
///
/// Cloned into application state so an operator can inspect and change the
/// level without restarting the process.
#[derive(Clone)]
pub struct LogLevelHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    current: Arc<RwLock<String>>,
}

impl std::fmt::Debug for LogLevelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLevelHandle")
            .field("current", &self.current())
            .finish()
    }
}

impl LogLevelHandle {
    /// A handle that is not attached to any installed subscriber.
    pub fn detached(level: &str) -> Self {
        Self {
            reload: None,
            current: Arc::new(RwLock::new(level.to_string())),
        }
    }

    pub fn current(&self) -> String {
        self.current
            .read()
            .map(|level| level.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set(&self, level: &str) -> Result<String, AppError> {
        let level = level.trim().to_lowercase();
        if !SUPPORTED_LEVELS.contains(&level.as_str()) {
            return Err(AppError::BadRequest(anyhow::anyhow!("not supported")));
        }

        if let Some(handle) = &self.reload {
            handle
                .reload(EnvFilter::new(&level))
                .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to reload log filter: {}", e)))?;
        }

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = level.clone();

        tracing::info!(level = %level, "Log level changed");
        Ok(level)
    }
}

pub fn init_tracing(
    service_name: &str,
    log_level: &str,
    otlp_endpoint: Option<&str>,
) -> Result<LogLevelHandle, AppError> {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(log_level));
    let (filter_layer, reload_handle) = reload::Layer::new(env_filter);

    let telemetry = match otlp_endpoint {
        Some(endpoint) => {
            let otlp_exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(otlp_exporter)
                .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                ])))
                .install_batch(runtime::Tokio)
                .map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "Failed to initialize OTLP tracer for service '{}' at endpoint '{}': {}",
                        service_name,
                        endpoint,
                        e
                    ))
                })?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(telemetry)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true),
        )
        .try_init()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to install subscriber: {}", e)))?;

    Ok(LogLevelHandle {
        reload: Some(reload_handle),
        current: Arc::new(RwLock::new(directive)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_tracks_level_changes() {
        let handle = LogLevelHandle::detached("info");
        assert_eq!(handle.current(), "info");

        let level = handle.set("DEBUG").expect("debug is supported");
        assert_eq!(level, "debug");
        assert_eq!(handle.current(), "debug");
    }

    #[test]
    fn unsupported_level_is_rejected() {
        let handle = LogLevelHandle::detached("info");
        assert!(matches!(handle.set("verbose"), Err(AppError::BadRequest(_))));
        assert_eq!(handle.current(), "info");
    }
}
