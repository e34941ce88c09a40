//! Logging setup and rate limiting
//!
//! Every component logs through `tracing`. Failure paths that can fire once
//! per frame or once per message go through [`log_limit!`](crate::log_limit),
//! which keeps a counter per call site and goes quiet once the ceiling is hit.

use std::fs::OpenOptions;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Per-call-site event counter backing `log_limit!`
pub struct RateLimit {
    count: AtomicU32,
}

impl RateLimit {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Returns true while fewer than `limit` events have been let through
    pub fn allow(&self, limit: u32) -> bool {
        self.count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    /// Number of events let through so far
    pub fn emitted(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit a tracing event at most `limit` times from this call site.
///
/// ```ignore
/// log_limit!(100, warn, "could not read window procedure of {:?}", hwnd);
/// ```
#[macro_export]
macro_rules! log_limit {
    ($limit:expr, $level:ident, $($arg:tt)+) => {{
        static LIMITER: $crate::logging::RateLimit = $crate::logging::RateLimit::new();
        if LIMITER.allow($limit) {
            ::tracing::$level!($($arg)+);
        }
    }};
}

/// Install the global subscriber
///
/// Returns false when a subscriber was already installed (the host may load
/// the shim twice under different names) or the log file could not be opened.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.file {
        Some(path) => {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(_) => return false,
            };
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .try_init()
                .is_ok()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .is_ok(),
    }
}
