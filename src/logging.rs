//! Process-wide tracing initialization.

use crate::error::{Result, ScanError};
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `tracing-subscriber` formatter using `level` as the default
/// filter directive (overridden by `RUST_LOG` if set). Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| ScanError::Internal(format!("invalid log level {level:?}: {e}")))?;

    // try_init returns Err if a subscriber is already installed; that's
    // expected in tests that call this more than once.
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
    Ok(())
}
