//! Process-wide logging setup.

use env_logger::{Builder, Env};

/// Install the `env_logger` backend once; `RUST_LOG` overrides `default_level`.
///
/// Repeated calls are ignored so tests and binaries can both call it freely.
pub fn init(default_level: &str) {
    let env = Env::default().default_filter_or(default_level);
    let _ = Builder::from_env(env)
        .format_timestamp_secs()
        .format_target(false)
        .try_init();
}
