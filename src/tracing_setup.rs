use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize tracing from the logging section of the configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing_with_config(logging: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .wrap_err_with(|| format!("Invalid log level: {}", logging.level))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let registry = Registry::default().with(env_filter);
    let result = if logging.json {
        registry
            .with(fmt_layer.json().with_current_span(true).with_span_list(true))
            .try_init()
    } else {
        registry.with(fmt_layer.pretty()).try_init()
    };
    result.wrap_err("a global tracing subscriber is already installed")?;

    tracing::info!(level = %logging.level, json = logging.json, "logging initialized");
    Ok(())
}

/// Create a request-scoped tracing span.
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Span wrapping the registration of one route.
pub fn create_registration_span(method: &str, input: &str) -> tracing::Span {
    tracing::debug_span!("register", http.method = method, input = input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_rejects_invalid_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let logging = LoggingConfig {
            level: "fieldroute=loud".to_string(),
            json: false,
        };
        assert!(init_tracing_with_config(&logging).is_err());
    }

    #[test]
    fn test_create_request_span() {
        let span = create_request_span("GET", "/7/stuff/World", "req-123");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "request");
        }
    }
}
