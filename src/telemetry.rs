//! Tracing subscriber setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding a tracing filter directive, e.g.
/// `ATTRIBUTION_LOG=u_attribution=debug`.
pub const LOG_ENV: &str = "ATTRIBUTION_LOG";

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `ATTRIBUTION_LOG` is unset or invalid.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Installs the global subscriber, preferring `ATTRIBUTION_LOG` over the
/// configured filter.
///
/// Returns `false` if a global subscriber was already installed; calling it
/// more than once is harmless.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.filter));
    install(filter, config.json)
}

/// Installs the global subscriber with an explicit filter, ignoring the
/// environment. Intended for embedding hosts and tests.
pub fn init_tracing_with_filter(filter: &str) -> bool {
    install(EnvFilter::new(filter), false)
}

fn install(filter: EnvFilter, json: bool) -> bool {
    let registry = tracing_subscriber::registry();
    let result = if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init()
    };
    result.is_ok()
}
