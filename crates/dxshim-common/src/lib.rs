//! Common utilities and types shared across dxshim crates
//!
//! - [`config`]: the process-wide settings snapshot (TOML + environment)
//! - [`logging`]: tracing setup and per-call-site rate limiting

pub mod config;
pub mod logging;

pub use config::{CompatConfig, ConfigError, GraphicsConfig, LoggingConfig, ShimConfig, WindowConfig};
pub use logging::RateLimit;

/// Default repeat ceiling for `log_limit!` call sites that report failures.
pub const DEFAULT_LOG_LIMIT: u32 = 100;
