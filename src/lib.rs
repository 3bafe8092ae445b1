// Claude-to-OpenAI proxy configuration and model tiering

pub mod api;
pub mod config;
pub mod proxy;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use api::{ModelManager, ModelResolution, ModelTier};
pub use config::{ConfigError, KeyProfile, Settings, StreamingMode};

/// Translate a LOG_LEVEL value into an `EnvFilter` directive.
pub fn log_filter_directive(log_level: &str) -> String {
    match log_level.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    }
}

/// Initialize tracing. `RUST_LOG` takes precedence over `log_level`.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter_directive(log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
