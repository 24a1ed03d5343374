//! Logging initialization

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive(&config.level)))
        .map_err(|e| crate::Error::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        _ => registry
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init(),
    };

    result.map_err(|e| crate::Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn directive(level: &str) -> String {
    format!("{},directgate=debug", level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive() {
        assert_eq!(directive("warn"), "warn,directgate=debug");
    }
}
