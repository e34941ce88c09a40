//! The DLL's process-wide state

use std::sync::OnceLock;

use dxshim_common::{ConfigError, ShimConfig};
use dxshim_core::ShimContext;

pub struct Runtime {
    context: ShimContext,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    pub fn new(config: ShimConfig) -> Self {
        Self {
            context: ShimContext::with_defaults(config),
        }
    }

    pub fn context(&self) -> &ShimContext {
        &self.context
    }

    pub fn config(&self) -> &ShimConfig {
        &self.context.config
    }

    pub fn window_hooks_enabled(&self) -> bool {
        self.config().window.hook_wndproc
    }
}

/// Read the configuration, falling back to defaults when it cannot be used
///
/// The error is handed back so it can be logged once logging is up.
pub fn load_config() -> (ShimConfig, Option<ConfigError>) {
    match ShimConfig::from_env() {
        Ok(config) => (config, None),
        Err(e) => {
            let mut config = ShimConfig::default();
            config.apply_env_overrides();
            (config, Some(e))
        }
    }
}

/// Bring up logging and the shared state; later calls return the first runtime
pub fn start() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let (config, error) = load_config();
        let logging = dxshim_common::logging::init(&config.logging);

        tracing::info!("dxshim DirectDraw wrapper loaded");
        if !logging {
            tracing::debug!("Logging subscriber was already installed");
        }
        if let Some(e) = error {
            tracing::warn!("Using default configuration: {}", e);
        }
        Runtime::new(config)
    })
}

pub fn get() -> Option<&'static Runtime> {
    RUNTIME.get()
}
