//! Tagged, per-module switchable logging macros.
//!
//! Usage:
//! ```rust,ignore
//! // In your module, define both constants first:
//! const ENABLE_LOGS: bool = true;
//! const LOG_TAG: &str = "capture";
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn};
//!
//! log_info!("camera opened at {}x{}", 1280, 720); // => "[capture] camera opened at 1280x720"
//! ```

/// Conditional info logging, prefixed with the calling module's `LOG_TAG`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}

/// Conditional warn logging, prefixed with the calling module's `LOG_TAG`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}

/// Conditional error logging, prefixed with the calling module's `LOG_TAG`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}

/// Conditional debug logging. Per-tick chatter goes here so the default
/// `Info` filter stays quiet while the camera is live.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}
