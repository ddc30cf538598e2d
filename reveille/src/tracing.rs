//! Logging setup.
//!
//! Modules import the macros through [`prelude`] so call sites read the
//! same everywhere. Binaries call [`init_journald_or_stdout`] once at
//! startup.

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Logs go to the systemd journal when its socket is reachable, otherwise
/// to stdout. `RUST_LOG` overrides the default `info` filter in both cases.
pub fn init_journald_or_stdout() {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    match tracing_journald::layer() {
        Ok(journald) => {
            let subscriber = Registry::default().with(filter()).with(journald);
            if tracing::subscriber::set_global_default(subscriber).is_err() {
                eprintln!("Global tracing subscriber already installed");
            }
        }
        Err(_) => {
            let subscriber = Registry::default()
                .with(filter())
                .with(fmt::layer().with_target(false));
            if tracing::subscriber::set_global_default(subscriber).is_err() {
                eprintln!("Global tracing subscriber already installed");
            }
        }
    }
}
