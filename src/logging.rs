//! Logging configuration using the `log` and `env_logger` crates.
//!
//! Levels as used by the runtime:
//!
//! - `error!` - failures that abort a pipeline run
//! - `info!`  - device selection, per-stage progress
//! - `debug!` - work-dimension plans, barrier waits
//!
//! Set `RUST_LOG` to control output at runtime:
//!
//! ```bash
//! RUST_LOG=info tilepipe linear
//! RUST_LOG=debug tilepipe attention
//! ```

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging from the RUST_LOG environment variable.
///
/// If RUST_LOG is not set, defaults to Warn level.
/// This only initializes once; subsequent calls are no-ops.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests.
///
/// Uses test-friendly output and suppresses most output unless RUST_LOG is
/// explicitly set.
pub fn init_test() {
    // try_init() doesn't panic if already initialized
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test();
        init_test();
    }
}
