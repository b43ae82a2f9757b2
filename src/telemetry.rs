//! Optional structured tracing (cargo feature `trace`).
//!
//! Enabled at runtime with USERLAND_EXEC_TRACE=1; the filter comes from USERLAND_EXEC_LOG
//! (default `info`). Without the feature, `telemetry_init` is a no-op.

use std::env;

use once_cell::sync::OnceCell;

static INIT: OnceCell<bool> = OnceCell::new();

pub fn telemetry_enabled_env() -> bool {
    matches!(
        env::var("USERLAND_EXEC_TRACE").ok().as_deref(),
        Some("1") | Some("true")
    )
}

/// Install the global subscriber once. Returns whether tracing is active.
pub fn telemetry_init() -> bool {
    *INIT.get_or_init(|| {
        if !telemetry_enabled_env() {
            return false;
        }
        install_subscriber()
    })
}

#[cfg(feature = "trace")]
fn install_subscriber() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = env::var("USERLAND_EXEC_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let filter = match EnvFilter::try_new(&filter) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("userland-exec: telemetry: invalid USERLAND_EXEC_LOG ({e}); using info");
            EnvFilter::new("info")
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "trace"))]
fn install_subscriber() -> bool {
    eprintln!("userland-exec: telemetry: built without the `trace` feature; ignoring USERLAND_EXEC_TRACE");
    false
}
