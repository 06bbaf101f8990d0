//! Tracing subscriber setup.

use crate::config::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Builds the filter: `RUST_LOG` when set, `settings.filter` otherwise.
#[must_use]
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter))
}

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed, which leaves
/// the existing one in place.
#[must_use = "false means another subscriber stayed installed"]
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(settings));
    let installed = if settings.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.is_ok()
}
