use crate::config::{Environment, LogLevel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// JSON logs in production, pretty logs locally.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn setup_logging(log_level: LogLevel, environment: Environment) {
    let default_filter = format!("{},ort=warn", log_level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match environment {
        Environment::Production => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(false)
                        .with_level(true)
                        .with_thread_names(true)
                        .with_thread_ids(true),
                )
                .init();
        }
        Environment::Local => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
