//! `tracing` initialization for binaries embedding this crate.
//!
//! Library code never installs a subscriber itself - only `init()`, called
//! once by a binary's `main`, does. Level is controlled by `RUST_LOG`,
//! defaulting to `info` if unset or unparsable.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` formatting layer reading `RUST_LOG`.
/// Safe to call at most once per process; a second call is a no-op logged
/// at `warn`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    if let Err(e) = result {
        tracing::warn!("tracing subscriber already initialized: {e}");
    }
}
