//! Log output for the server binary.
//!
//! Tracing starts at `info` before configuration is read. Once the config is
//! loaded, [`apply_logging_level`] swaps in `logging.level` through the reload
//! layer, unless `RUST_LOG` was given, which is then kept for the whole run.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

/// HTTP plumbing that is noisy at `debug` and below.
const DEPENDENCY_DIRECTIVES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,h2=warn";

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

fn rust_log_is_set() -> bool {
    std::env::var_os("RUST_LOG").is_some_and(|v| !v.is_empty())
}

/// Filter for a configured level, with the dependency directives appended.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("{level},{DEPENDENCY_DIRECTIVES}"))
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{DEPENDENCY_DIRECTIVES}")))
}

pub fn init_tracing() {
    let base_filter = if rust_log_is_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter("info"))
    } else {
        level_filter("info")
    };

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switches to the configured level. Returns whether the filter changed.
pub fn apply_logging_level(level: &str) -> bool {
    if rust_log_is_set() {
        tracing::debug!(level, "RUST_LOG is set, configured log level ignored");
        return false;
    }
    match LOG_RELOAD_HANDLE.get() {
        Some(handle) => handle.modify(|f| *f = level_filter(level)).is_ok(),
        None => false,
    }
}
