// toolsync/src/utils/logging.rs
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "toolsync=info";

/// Installs the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // a subscriber may already be installed, e.g. by a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
