//! Process-wide shim state
//!
//! The DLL owns one [`ShimContext`]; tests build their own.

use std::sync::Arc;

use dxshim_common::ShimConfig;

use crate::device::DeviceStates;
use crate::identity::IdentityTable;
use crate::interface::known::DEVICE9_REJECTED;
use crate::proxy::InterfaceCatalog;

pub struct ShimContext {
    pub config: Arc<ShimConfig>,
    pub identity: IdentityTable,
    pub devices: DeviceStates,
    pub catalog: InterfaceCatalog,
}

impl ShimContext {
    pub fn new(config: ShimConfig, catalog: InterfaceCatalog) -> Self {
        Self {
            config: Arc::new(config),
            identity: IdentityTable::new(),
            devices: DeviceStates::new(),
            catalog,
        }
    }

    /// Context with an empty catalog that only refuses the interfaces a
    /// Direct3D9 device must never hand out
    pub fn with_defaults(config: ShimConfig) -> Self {
        let mut catalog = InterfaceCatalog::new();
        catalog.reject_all(&DEVICE9_REJECTED);
        Self::new(config, catalog)
    }

    /// Drop every wrapper and device state (module unload)
    pub fn shutdown(&self) {
        let wrappers = self.identity.clear();
        let devices = self.devices.len();
        self.devices.clear();
        tracing::info!(
            "Shim context shut down ({} wrappers, {} device states dropped)",
            wrappers,
            devices
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InstanceId;
    use crate::identity::{RealAddr, Wrapper};
    use crate::interface::known::*;
    use crate::interface::InterfaceId;

    struct Marker(RealAddr);

    impl Wrapper for Marker {
        fn interface(&self) -> InterfaceId {
            IID_IDIRECTDRAWCLIPPER
        }

        fn real_address(&self) -> Option<RealAddr> {
            Some(self.0)
        }
    }

    #[test]
    fn test_defaults_reject_device9_probes() {
        let ctx = ShimContext::with_defaults(ShimConfig::default());
        assert!(DEVICE9_REJECTED.iter().all(|iid| ctx.catalog.is_rejected(iid)));
        assert!(!ctx.catalog.is_rejected(&IID_IDIRECT3DDEVICE9));
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let ctx = ShimContext::with_defaults(ShimConfig::default());
        ctx.identity
            .find_or_create(RealAddr(0x1000), IID_IDIRECTDRAWCLIPPER, || Marker(RealAddr(0x1000)))
            .unwrap();
        ctx.devices.attach(ctx.devices.allocate_key(), InstanceId::next());

        ctx.shutdown();
        assert!(ctx.identity.is_empty());
        assert!(ctx.devices.is_empty());
    }
}
