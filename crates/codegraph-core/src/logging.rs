use crate::config::{LogFormat, LoggingConfig};
use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber. `RUST_LOG` wins over `config.level`.
/// Later calls, or a subscriber installed elsewhere, leave things untouched.
pub fn init_tracing(config: &LoggingConfig) {
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
        let registry = tracing_subscriber::registry().with(filter);
        let _ = match config.format {
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_target(false))
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = LoggingConfig {
            level: "debug".into(),
            format: LogFormat::Json,
        };
        init_tracing(&config);
        init_tracing(&LoggingConfig::default());
        tracing::info!("still logging");
    }
}
