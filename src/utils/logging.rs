use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::utils::config::{LogFormat, LoggingConfig};
use crate::utils::error::{AgentError, AgentResult};

/// Driver and transport crates that are too chatty at `info`
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("tokio_postgres", "warn"),
    ("mysql_async", "warn"),
    ("hyper", "warn"),
    ("reqwest", "warn"),
];

/// Build the filter from `RUST_LOG` when set, otherwise from the configured level
fn build_env_filter(level: &str) -> AgentResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    for (target, lvl) in NOISY_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| AgentError::Configuration(format!("Invalid log filter '{}': {}", filter_str, e)))
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for CLI output.
pub fn init_logging(config: &LoggingConfig) -> AgentResult<()> {
    let filter = build_env_filter(&config.level)?;

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| AgentError::Internal(format!("Failed to install log subscriber: {}", e)))?;

    tracing::trace!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}

/// Root span carried by every component of one agent instance
pub fn agent_span(agent_id: &str, connector_id: &str) -> Span {
    tracing::info_span!("agent", agent_id = %agent_id, connector_id = %connector_id)
}
