//! OS-level compatibility hooks
//!
//! This module handles:
//! - Reporting an older Windows release through `GetVersion`/`GetVersionEx`
//! - Yielding the CPU from busy-wait loops in message and timer APIs
//!
//! The profile table and the yield bookkeeping are plain Rust; only
//! [`hooks`] touches the process and is Windows-only.

pub mod busy_wait;
pub mod installed;
pub mod profile;

#[cfg(windows)]
pub mod hooks;

use thiserror::Error;

pub use installed::{FeatureOutcome, InstalledHooks};
pub use profile::{ActiveLie, OsVersionInfo, VersionLie, PROFILES};

#[derive(Error, Debug)]
pub enum VersionHookError {
    #[error("Unknown Windows version profile: {0}")]
    UnknownProfile(String),

    #[error("Failed to load {module}: {reason}")]
    MissingModule { module: &'static str, reason: String },

    #[error("{module} does not export {symbol}")]
    MissingExport { module: &'static str, symbol: String },

    #[error("Failed to hook {symbol}: {reason}")]
    Detour { symbol: String, reason: String },

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),
}

pub type Result<T> = std::result::Result<T, VersionHookError>;
