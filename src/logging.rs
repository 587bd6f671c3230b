//! Logging setup on top of `tracing`.
//!
//! Behavior is steered by environment variables so the player can be
//! debugged without touching the config file:
//! - `INLIMBO_LOG_LEVEL`: an `EnvFilter` directive (default `inlimbo=info`)
//! - `INLIMBO_LOG_FILE`: append logs to this file instead of stderr
//! - `INLIMBO_LOG_PATTERN`: `compact` (default) or `full`

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::layer::{Layer, Layered};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

pub const ENV_LOG_LEVEL: &str = "INLIMBO_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "INLIMBO_LOG_FILE";
pub const ENV_LOG_PATTERN: &str = "INLIMBO_LOG_PATTERN";

/// Initialize the global tracing subscriber.
///
/// Called once from `main`; later calls are ignored (useful in tests where
/// several cases may race to install a subscriber).
pub fn init() {
    let filter = match std::env::var(ENV_LOG_LEVEL) {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new("inlimbo=info"),
    };

    let compact = !matches!(
        std::env::var(ENV_LOG_PATTERN).as_deref(),
        Ok("full") | Ok("FULL")
    );

    let layer: Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync> = match std::env::var(
        ENV_LOG_FILE,
    ) {
        Ok(path) if !path.is_empty() => {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    let writer = Mutex::new(file);
                    if compact {
                        fmt::layer()
                            .compact()
                            .with_ansi(false)
                            .with_writer(writer)
                            .boxed()
                    } else {
                        fmt::layer().with_ansi(false).with_writer(writer).boxed()
                    }
                }
                Err(e) => {
                    eprintln!("inlimbo: cannot open log file {path}: {e}, logging to stderr");
                    fmt::layer().compact().boxed()
                }
            }
        }
        _ => {
            if compact {
                fmt::layer().compact().boxed()
            } else {
                fmt::layer().boxed()
            }
        }
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
