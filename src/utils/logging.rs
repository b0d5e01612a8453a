//! Logger setup plus per-module switches for chatty call sites.
//!
//! The poller, capture stage and bridge log every cycle. Each of those
//! modules declares a flag and logs through the macros below so it can be
//! silenced without touching `RUST_LOG`:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("distance to target: {:.2} m", distance);
//! ```

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs `env_logger` at `info` unless `RUST_LOG` says otherwise. Safe to
/// call more than once.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .try_init();
    });
}

/// `log::info!` gated on the calling module's `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
