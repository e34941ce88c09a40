//! dxshim core
//!
//! Platform-neutral pieces every wrapper shares:
//! - `identity` - real address → wrapper table with build-once semantics
//! - `proxy` - QueryInterface/AddRef/Release contract and parameter translation
//! - `device` - per-device state shared by aliasing wrappers
//! - `com` - `RealObject` over a raw IUnknown pointer

pub mod com;
pub mod context;
pub mod device;
pub mod identity;
pub mod interface;
pub mod proxy;

pub use com::ComObject;
pub use context::ShimContext;
pub use device::{DeviceKey, DeviceSharedState, DeviceStates, InstanceId, SharedDevice};
pub use identity::{IdentityError, IdentityTable, RealAddr, Wrapper, WrapperEntry};
pub use interface::{HResult, InterfaceFamily, InterfaceId, InterfaceKind};
pub use proxy::{Interface, InterfaceCatalog, ProxyObject, RealObject, Recycler};
