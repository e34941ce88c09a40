//! Shim configuration
//!
//! The settings snapshot is read once when the DLL attaches and handed to
//! every component by reference. Lookup order:
//! - `DXSHIM_CONFIG` – explicit path to a TOML file
//! - `dxshim.toml` next to the host executable
//! - built-in defaults
//!
//! `DXSHIM_LOG` overrides `logging.level` after the file has been read.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DXSHIM_CONFIG";

/// Environment variable overriding the log level.
pub const LOG_ENV: &str = "DXSHIM_LOG";

/// File name searched for beside the host executable.
pub const CONFIG_FILE_NAME: &str = "dxshim.toml";

/// Highest anisotropy level any driver reports.
const MAX_ANISOTROPY: u32 = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Logging sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"dxshim_wndproc=debug"`
    pub level: String,
    /// Append log lines to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Direct3D workaround toggles consumed by the per-device state cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Re-apply cached clip planes before every draw call
    pub cache_clip_plane: bool,
    /// 0 = untouched, 1 = driver maximum, N = min(N, driver maximum)
    pub anisotropic_filtering: u32,
    /// Present rate cap in frames per second, 0 = unlimited
    pub limit_per_frame_fps: f64,
    /// Run exclusive-fullscreen applications in a borderless window
    pub fullscreen_window_mode: bool,
    /// Try multisampling when the application did not ask for it
    pub anti_aliasing: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            cache_clip_plane: false,
            anisotropic_filtering: 0,
            limit_per_frame_fps: 0.0,
            fullscreen_window_mode: false,
            anti_aliasing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Subclass the application's device window
    pub hook_wndproc: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { hook_wndproc: true }
    }
}

/// OS-level compatibility hooks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    /// Version profile reported by GetVersion/GetVersionEx (`"95"`, `"98"`, `"xp"`, ...)
    pub win_version_lie: Option<String>,
    /// Service pack number reported alongside the lie, 0 = none
    pub win_version_lie_sp: u32,
    /// Insert voluntary yields into busy-wait prone APIs
    pub busy_wait_mitigation: bool,
    /// Thread cycles a caller may spin before it is forced to yield
    pub thread_switch_cycle_time: u64,
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            win_version_lie: None,
            win_version_lie_sp: 0,
            busy_wait_mitigation: false,
            thread_switch_cycle_time: 1_000_000,
        }
    }
}

/// Process-wide settings snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    pub logging: LoggingConfig,
    pub graphics: GraphicsConfig,
    pub window: WindowConfig,
    pub compat: CompatConfig,
}

impl ShimConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ShimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Resolve the config the way the DLL does on attach
    ///
    /// A missing default file is not an error; a broken one is.
    pub fn from_env() -> Result<Self> {
        let mut config = match Self::locate() {
            Some(path) if path.is_file() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)?
            }
            Some(path) if std::env::var_os(CONFIG_ENV).is_some() => {
                return Err(ConfigError::Io {
                    path,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Path the config would be read from, if any can be derived
    pub fn locate() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(explicit));
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
    }

    /// Apply `DXSHIM_LOG`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_ENV) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Reject values no component can act on
    pub fn validate(&self) -> Result<()> {
        let fps = self.graphics.limit_per_frame_fps;
        if !fps.is_finite() || fps < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "graphics.limit_per_frame_fps must be a non-negative number, got {fps}"
            )));
        }
        if self.graphics.anisotropic_filtering > MAX_ANISOTROPY {
            return Err(ConfigError::Invalid(format!(
                "graphics.anisotropic_filtering must be 0..={MAX_ANISOTROPY}, got {}",
                self.graphics.anisotropic_filtering
            )));
        }
        if let Some(name) = &self.compat.win_version_lie {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "compat.win_version_lie must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Render the resolved config back to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
