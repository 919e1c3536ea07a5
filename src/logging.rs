use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "BENCHTRAIL_LOG";

/// Installs the stderr fmt subscriber. `BENCHTRAIL_LOG` wins over
/// `default_filter`; an unparsable filter falls back to `warn`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
