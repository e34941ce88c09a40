//! Proxy objects and the COM reference contract
//!
//! A [`ProxyObject`] stands in for one real interface pointer. It answers
//! `QueryInterface` for its own family locally, forwards everything else to
//! the real object and wraps whatever comes back through the
//! [`InterfaceCatalog`]. Reference counting is forwarded to the real object;
//! placeholders (wrappers created before a real object exists) keep their own
//! count. At zero the identity entry and the device binding are dropped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::context::ShimContext;
use crate::device::{DeviceKey, InstanceId, SharedDevice};
use crate::identity::{IdentityError, RealAddr, Wrapper};
use crate::interface::known::{IID_GET_INTERFACE_X, IID_GET_REAL_INTERFACE, IID_IUNKNOWN};
use crate::interface::{HResult, InterfaceFamily, InterfaceId, InterfaceKind};

// ============================================================================
// Real object boundary
// ============================================================================

/// The object a proxy forwards to
pub trait RealObject: Send + Sync + 'static {
    fn address(&self) -> RealAddr;

    /// Ask the real object for `iid`; on success the returned pointer carries
    /// one new reference.
    fn query_interface(&self, iid: &InterfaceId) -> Result<RealAddr, HResult>;

    fn add_ref(&self) -> u32;

    fn release(&self) -> u32;
}

/// What a `QueryInterface` produced
#[derive(Clone)]
pub enum Interface {
    /// A wrapper recorded in the identity table
    Wrapper(Arc<dyn Wrapper>),
    /// A real pointer handed out as-is (probe answer or unknown interface)
    Real(RealAddr),
}

impl Interface {
    pub fn wrapper(&self) -> Option<&Arc<dyn Wrapper>> {
        match self {
            Interface::Wrapper(w) => Some(w),
            Interface::Real(_) => None,
        }
    }

    /// Address the caller would see: the real pointer behind a wrapper
    pub fn real_address(&self) -> Option<RealAddr> {
        match self {
            Interface::Wrapper(w) => w.real_address(),
            Interface::Real(addr) => Some(*addr),
        }
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Wrapper(w) => write!(f, "Wrapper({:?})", w.interface()),
            Interface::Real(addr) => write!(f, "Real({addr:?})"),
        }
    }
}

// ============================================================================
// InterfaceCatalog
// ============================================================================

type WrapFn =
    Arc<dyn Fn(&ShimContext, RealAddr, InterfaceId) -> Result<Arc<dyn Wrapper>, IdentityError> + Send + Sync>;

/// Wrapper factories keyed by interface id
///
/// Registering a family makes every member id resolve to the same factory.
#[derive(Default)]
pub struct InterfaceCatalog {
    factories: HashMap<InterfaceId, WrapFn>,
    rejected: HashSet<InterfaceId>,
}

impl InterfaceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `make` for every member of `family`
    ///
    /// `make` runs under the identity table lock and must only construct.
    pub fn register<W, F>(&mut self, family: &'static InterfaceFamily, make: F)
    where
        W: Wrapper,
        F: Fn(&ShimContext, RealAddr, InterfaceId) -> W + Send + Sync + 'static,
    {
        let make = Arc::new(make);
        for member in family.members {
            let make = make.clone();
            let wrap: WrapFn = Arc::new(move |ctx: &ShimContext, real: RealAddr, iid: InterfaceId| {
                let wrapper = ctx.identity.find_or_create(real, iid, || make(ctx, real, iid))?;
                Ok(wrapper as Arc<dyn Wrapper>)
            });
            self.factories.insert(member.id, wrap);
        }
    }

    /// Answer `iid` with `E_NOINTERFACE` without asking the real object
    pub fn reject(&mut self, iid: InterfaceId) {
        self.rejected.insert(iid);
    }

    pub fn reject_all(&mut self, iids: &[InterfaceId]) {
        self.rejected.extend(iids.iter().copied());
    }

    pub fn is_rejected(&self, iid: &InterfaceId) -> bool {
        self.rejected.contains(iid)
    }

    pub fn is_known(&self, iid: &InterfaceId) -> bool {
        self.factories.contains_key(iid)
    }

    /// Wrap a real pointer obtained for `iid`
    ///
    /// Returns `None` when no factory covers `iid`; the caller hands the real
    /// pointer out unchanged.
    pub fn wrap(
        &self,
        ctx: &ShimContext,
        real: RealAddr,
        iid: InterfaceId,
    ) -> Option<Result<Arc<dyn Wrapper>, IdentityError>> {
        self.factories.get(&iid).map(|wrap| wrap(ctx, real, iid))
    }
}

// ============================================================================
// Parameter translation
// ============================================================================

/// Real pointer to pass down for a wrapper-typed argument
pub fn unwrap_param(param: Option<&Arc<dyn Wrapper>>) -> Option<RealAddr> {
    param.and_then(|w| w.real_address())
}

/// Wrap a pointer the real object wrote to an out-parameter
///
/// Null stays null. Anything the catalog cannot wrap is returned as-is.
pub fn wrap_out_param(ctx: &ShimContext, iid: InterfaceId, out: RealAddr) -> Option<Interface> {
    if out.is_null() {
        return None;
    }
    match ctx.catalog.wrap(ctx, out, iid) {
        Some(Ok(wrapper)) => Some(Interface::Wrapper(wrapper)),
        Some(Err(e)) => {
            dxshim_common::log_limit!(
                dxshim_common::DEFAULT_LOG_LIMIT,
                warn,
                "could not wrap {:?} at {:?}: {}",
                iid,
                out,
                e
            );
            Some(Interface::Real(out))
        }
        None => Some(Interface::Real(out)),
    }
}

// ============================================================================
// Recycler
// ============================================================================

/// Single-slot cache of a released wrapper, reused by the next creation
pub struct Recycler<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Recycler<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Keep `value`; returns the one it displaced
    pub fn stash(&self, value: T) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value)
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T> Default for Recycler<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ProxyObject
// ============================================================================

struct DeviceBinding {
    key: DeviceKey,
    instance: InstanceId,
    state: SharedDevice,
}

/// Wrapper standing in for one real interface
pub struct ProxyObject<R: RealObject> {
    kind: InterfaceKind,
    key: RealAddr,
    real: Option<R>,
    refs: AtomicU32,
    device: Option<DeviceBinding>,
}

impl<R: RealObject> ProxyObject<R> {
    fn build(ctx: &ShimContext, key: RealAddr, real: Option<R>, kind: InterfaceKind, device: Option<DeviceKey>) -> Self {
        let device = device.map(|key| {
            let instance = InstanceId::next();
            DeviceBinding {
                key,
                instance,
                state: ctx.devices.attach(key, instance),
            }
        });
        Self {
            kind,
            key,
            real,
            refs: AtomicU32::new(1),
            device,
        }
    }

    /// Wrapper for `real`, reusing the recorded one when present
    pub fn wrap(ctx: &ShimContext, real: R, kind: InterfaceKind) -> Result<Arc<Self>, IdentityError> {
        let key = real.address();
        ctx.identity
            .find_or_create(key, kind.id, || Self::build(ctx, key, Some(real), kind, None))
    }

    /// Like [`ProxyObject::wrap`], and share the state of `device`
    ///
    /// A wrapper that already exists keeps the device it was created with.
    pub fn wrap_device(
        ctx: &ShimContext,
        real: R,
        kind: InterfaceKind,
        device: DeviceKey,
    ) -> Result<Arc<Self>, IdentityError> {
        let key = real.address();
        let wrapper = ctx.identity.find_or_create(key, kind.id, || {
            Self::build(ctx, key, Some(real), kind, Some(device))
        })?;
        if wrapper.device_key() != Some(device) {
            dxshim_common::log_limit!(
                dxshim_common::DEFAULT_LOG_LIMIT,
                warn,
                "{:?} wrapper for {:?} is bound to device {:?}, not {:?}",
                kind.id,
                key,
                wrapper.device_key(),
                device
            );
        }
        Ok(wrapper)
    }

    /// Wrapper with no real object yet, holding one reference
    pub fn placeholder(ctx: &ShimContext, kind: InterfaceKind) -> Result<Arc<Self>, IdentityError> {
        let key = ctx.identity.placeholder_key();
        ctx.identity
            .find_or_create(key, kind.id, || Self::build(ctx, key, None, kind, None))
    }

    /// Placeholder taken from `recycler` when it holds one of the same kind
    pub fn placeholder_recycled(
        ctx: &ShimContext,
        kind: InterfaceKind,
        recycler: &Recycler<Arc<Self>>,
    ) -> Result<Arc<Self>, IdentityError> {
        match recycler.take() {
            Some(cached) if cached.real.is_none() && cached.kind.id == kind.id => {
                tracing::debug!("Reusing cached {:?} wrapper", kind.id);
                cached.refs.store(1, Ordering::Release);
                ctx.identity.insert(cached.key, cached)
            }
            _ => Self::placeholder(ctx, kind),
        }
    }

    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    pub fn key(&self) -> RealAddr {
        self.key
    }

    pub fn real(&self) -> Option<&R> {
        self.real.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.real.is_none()
    }

    pub fn device_key(&self) -> Option<DeviceKey> {
        self.device.as_ref().map(|d| d.key)
    }

    pub fn device_state(&self) -> Option<&SharedDevice> {
        self.device.as_ref().map(|d| &d.state)
    }

    /// Internal count of a placeholder
    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    pub fn query_interface(self: &Arc<Self>, ctx: &ShimContext, iid: &InterfaceId) -> Result<Interface, HResult> {
        if *iid == IID_GET_REAL_INTERFACE {
            return self
                .real
                .as_ref()
                .map(|real| Interface::Real(real.address()))
                .ok_or(HResult::E_NOINTERFACE);
        }
        if *iid == IID_GET_INTERFACE_X {
            return Ok(Interface::Wrapper(self.clone()));
        }
        if *iid == IID_IUNKNOWN || self.kind.is_compatible(iid) {
            self.add_ref();
            return Ok(Interface::Wrapper(self.clone()));
        }
        if ctx.catalog.is_rejected(iid) {
            tracing::debug!("Refusing {:?} on {:?}", iid, self.kind.id);
            return Err(HResult::E_NOINTERFACE);
        }

        let real = self.real.as_ref().ok_or(HResult::E_NOINTERFACE)?;
        let addr = real.query_interface(iid)?;
        if addr.is_null() {
            return Err(HResult::E_POINTER);
        }
        wrap_out_param(ctx, *iid, addr).ok_or(HResult::E_POINTER)
    }

    pub fn add_ref(&self) -> u32 {
        match &self.real {
            Some(real) => real.add_ref(),
            None => self.refs.fetch_add(1, Ordering::AcqRel) + 1,
        }
    }

    pub fn release(&self, ctx: &ShimContext) -> u32 {
        let remaining = match &self.real {
            Some(real) => real.release(),
            None => match self
                .refs
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            {
                Ok(previous) => previous - 1,
                Err(_) => return 0,
            },
        };
        if remaining == 0 {
            self.teardown(ctx);
        }
        remaining
    }

    /// Release a placeholder; at zero it goes to `recycler` instead of away
    pub fn release_to(self: &Arc<Self>, ctx: &ShimContext, recycler: &Recycler<Arc<Self>>) -> u32 {
        let remaining = self.release(ctx);
        if remaining == 0 && self.is_placeholder() {
            recycler.stash(self.clone());
        }
        remaining
    }

    fn teardown(&self, ctx: &ShimContext) {
        tracing::debug!("Last reference to {:?} at {:?} released", self.kind.id, self.key);
        ctx.identity.forget_entry(self.key, self.kind.id);
        if let Some(device) = &self.device {
            ctx.devices.detach(device.key, device.instance);
        }
    }
}

impl<R: RealObject> Wrapper for ProxyObject<R> {
    fn interface(&self) -> InterfaceId {
        self.kind.id
    }

    fn is_compatible(&self, requested: &InterfaceId) -> bool {
        self.kind.is_compatible(requested)
    }

    fn real_address(&self) -> Option<RealAddr> {
        self.real.as_ref().map(RealObject::address)
    }
}

impl<R: RealObject> fmt::Debug for ProxyObject<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyObject")
            .field("kind", &self.kind.id)
            .field("key", &self.key)
            .field("placeholder", &self.real.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::known::*;
    use dxshim_common::ShimConfig;

    /// Stand-in for a real COM object
    struct FakeReal {
        addr: RealAddr,
        refs: Arc<AtomicU32>,
        answers: HashMap<InterfaceId, RealAddr>,
        queried: Arc<AtomicU32>,
    }

    impl FakeReal {
        fn new(addr: usize) -> Self {
            Self {
                addr: RealAddr(addr),
                refs: Arc::new(AtomicU32::new(1)),
                answers: HashMap::new(),
                queried: Arc::new(AtomicU32::new(0)),
            }
        }

        fn answering(mut self, iid: InterfaceId, addr: usize) -> Self {
            self.answers.insert(iid, RealAddr(addr));
            self
        }
    }

    impl RealObject for FakeReal {
        fn address(&self) -> RealAddr {
            self.addr
        }

        fn query_interface(&self, iid: &InterfaceId) -> Result<RealAddr, HResult> {
            self.queried.fetch_add(1, Ordering::SeqCst);
            let addr = self.answers.get(iid).copied().ok_or(HResult::E_NOINTERFACE)?;
            self.refs.fetch_add(1, Ordering::SeqCst);
            Ok(addr)
        }

        fn add_ref(&self) -> u32 {
            self.refs.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn release(&self) -> u32 {
            self.refs.fetch_sub(1, Ordering::SeqCst) - 1
        }
    }

    type Proxy = ProxyObject<FakeReal>;

    const DDRAW7: InterfaceKind = InterfaceKind::new(IID_IDIRECTDRAW7, &DIRECTDRAW);
    const CLIPPER: InterfaceKind = InterfaceKind::new(IID_IDIRECTDRAWCLIPPER, &DIRECTDRAW_CLIPPER);
    const COLOR: InterfaceKind = InterfaceKind::new(IID_IDIRECTDRAWCOLORCONTROL, &DIRECTDRAW_COLOR_CONTROL);
    const DEVICE9: InterfaceKind = InterfaceKind::new(IID_IDIRECT3DDEVICE9, &DIRECT3D_DEVICE9);

    fn context() -> ShimContext {
        let mut catalog = InterfaceCatalog::new();
        catalog.register(&DIRECTDRAW_CLIPPER, |ctx, real, iid| {
            Proxy::build(ctx, real, Some(FakeReal::new(real.0)), InterfaceKind::new(iid, &DIRECTDRAW_CLIPPER), None)
        });
        catalog.reject_all(&DEVICE9_REJECTED);
        ShimContext::new(ShimConfig::default(), catalog)
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let ctx = context();
        let a = Proxy::wrap(&ctx, FakeReal::new(0x1000), DDRAW7).unwrap();
        let b = Proxy::wrap(&ctx, FakeReal::new(0x1000), DDRAW7).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(ctx.identity.len(), 1);
    }

    #[test]
    fn test_query_own_family_returns_self_with_reference() {
        let ctx = context();
        let real = FakeReal::new(0x1000);
        let refs = real.refs.clone();
        let proxy = Proxy::wrap(&ctx, real, DDRAW7).unwrap();

        let got = proxy.query_interface(&ctx, &IID_IDIRECTDRAW2).unwrap();
        let got = got.wrapper().unwrap();
        assert!(std::ptr::addr_eq(Arc::as_ptr(got), Arc::as_ptr(&proxy)));
        assert_eq!(refs.load(Ordering::SeqCst), 2);

        proxy.query_interface(&ctx, &IID_IUNKNOWN).unwrap();
        assert_eq!(refs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_probes_do_not_touch_references() {
        let ctx = context();
        let real = FakeReal::new(0x1000);
        let refs = real.refs.clone();
        let proxy = Proxy::wrap(&ctx, real, DDRAW7).unwrap();

        let real_ptr = proxy.query_interface(&ctx, &IID_GET_REAL_INTERFACE).unwrap();
        assert!(matches!(real_ptr, Interface::Real(RealAddr(0x1000))));
        let this = proxy.query_interface(&ctx, &IID_GET_INTERFACE_X).unwrap();
        assert!(this.wrapper().is_some());
        assert_eq!(refs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_interface_is_not_forwarded() {
        let ctx = context();
        let real = FakeReal::new(0x1000).answering(DEVICE9_REJECTED[0], 0x9000);
        let queried = real.queried.clone();
        let proxy = Proxy::wrap(&ctx, real, DEVICE9).unwrap();

        let err = proxy.query_interface(&ctx, &DEVICE9_REJECTED[0]).unwrap_err();
        assert_eq!(err, HResult::E_NOINTERFACE);
        assert_eq!(queried.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_forwarded_query_wraps_result_once() {
        let ctx = context();
        let real = FakeReal::new(0x1000).answering(IID_IDIRECTDRAWCLIPPER, 0x2000);
        let proxy = Proxy::wrap(&ctx, real, DDRAW7).unwrap();

        let first = proxy.query_interface(&ctx, &IID_IDIRECTDRAWCLIPPER).unwrap();
        let second = proxy.query_interface(&ctx, &IID_IDIRECTDRAWCLIPPER).unwrap();
        let (first, second) = (first.wrapper().unwrap(), second.wrapper().unwrap());
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(first.real_address(), Some(RealAddr(0x2000)));
        assert!(ctx.identity.contains(RealAddr(0x2000)));
    }

    #[test]
    fn test_unknown_interface_returned_unwrapped() {
        let ctx = context();
        let real = FakeReal::new(0x1000).answering(IID_IDIRECT3DMATERIAL, 0x3000);
        let proxy = Proxy::wrap(&ctx, real, DDRAW7).unwrap();

        let got = proxy.query_interface(&ctx, &IID_IDIRECT3DMATERIAL).unwrap();
        assert!(matches!(got, Interface::Real(RealAddr(0x3000))));
        assert!(proxy.query_interface(&ctx, &IID_IDIRECT3DMATERIAL2).is_err());
    }

    #[test]
    fn test_release_to_zero_forgets_entry() {
        let ctx = context();
        let proxy = Proxy::wrap(&ctx, FakeReal::new(0x1000), DDRAW7).unwrap();
        assert_eq!(proxy.add_ref(), 2);
        assert_eq!(proxy.release(&ctx), 1);
        assert!(ctx.identity.contains(RealAddr(0x1000)));
        assert_eq!(proxy.release(&ctx), 0);
        assert!(!ctx.identity.contains(RealAddr(0x1000)));

        let fresh = Proxy::wrap(&ctx, FakeReal::new(0x1000), DDRAW7).unwrap();
        assert!(!Arc::ptr_eq(&proxy, &fresh));
    }

    #[test]
    fn test_placeholder_counts_locally() {
        let ctx = context();
        let proxy = Proxy::placeholder(&ctx, COLOR).unwrap();
        assert!(proxy.key().is_placeholder());
        assert_eq!(proxy.add_ref(), 2);
        assert_eq!(proxy.release(&ctx), 1);
        assert_eq!(proxy.release(&ctx), 0);
        assert!(ctx.identity.is_empty());
        // Releasing past zero is a no-op.
        assert_eq!(proxy.release(&ctx), 0);
        assert_eq!(
            proxy.query_interface(&ctx, &IID_GET_REAL_INTERFACE).unwrap_err(),
            HResult::E_NOINTERFACE
        );
    }

    #[test]
    fn test_recycled_placeholder_reused() {
        let ctx = context();
        let recycler = Recycler::new();
        let first = Proxy::placeholder_recycled(&ctx, COLOR, &recycler).unwrap();
        assert_eq!(first.release_to(&ctx, &recycler), 0);
        assert!(!recycler.is_empty());

        let second = Proxy::placeholder_recycled(&ctx, COLOR, &recycler).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.ref_count(), 1);
        assert!(ctx.identity.contains(second.key()));

        let other = Proxy::placeholder_recycled(&ctx, CLIPPER, &recycler).unwrap();
        assert!(!Arc::ptr_eq(&other, &second));
    }

    #[test]
    fn test_device_state_shared_until_last_release() {
        let ctx = context();
        let key = ctx.devices.allocate_key();
        let plain = Proxy::wrap_device(&ctx, FakeReal::new(0x1000), DEVICE9, key).unwrap();
        let ex_kind = InterfaceKind::new(IID_IDIRECT3DDEVICE9EX, &DIRECT3D_DEVICE9);
        let ex = Proxy::wrap_device(&ctx, FakeReal::new(0x2000), ex_kind, key).unwrap();

        assert!(Arc::ptr_eq(plain.device_state().unwrap(), ex.device_state().unwrap()));
        assert_eq!(plain.release(&ctx), 0);
        assert!(ctx.devices.contains(key));
        assert_eq!(ex.release(&ctx), 0);
        assert!(!ctx.devices.contains(key));
    }

    #[test]
    fn test_existing_wrapper_keeps_its_device() {
        let ctx = context();
        let first = ctx.devices.allocate_key();
        let second = ctx.devices.allocate_key();
        let bound = Proxy::wrap_device(&ctx, FakeReal::new(0x1000), DEVICE9, first).unwrap();
        let again = Proxy::wrap_device(&ctx, FakeReal::new(0x1000), DEVICE9, second).unwrap();

        assert!(Arc::ptr_eq(&bound, &again));
        assert_eq!(again.device_key(), Some(first));
        assert!(!ctx.devices.contains(second));

        let unbound = Proxy::wrap(&ctx, FakeReal::new(0x2000), DEVICE9).unwrap();
        let rebound = Proxy::wrap_device(&ctx, FakeReal::new(0x2000), DEVICE9, second).unwrap();
        assert!(Arc::ptr_eq(&unbound, &rebound));
        assert_eq!(rebound.device_key(), None);
        assert!(!ctx.devices.contains(second));
    }

    #[test]
    fn test_param_translation() {
        let ctx = context();
        let proxy = Proxy::wrap(&ctx, FakeReal::new(0x1000), DDRAW7).unwrap();
        let as_dyn: Arc<dyn Wrapper> = proxy;
        assert_eq!(unwrap_param(Some(&as_dyn)), Some(RealAddr(0x1000)));
        assert_eq!(unwrap_param(None), None);

        assert!(wrap_out_param(&ctx, IID_IDIRECTDRAWCLIPPER, RealAddr(0)).is_none());
        let out = wrap_out_param(&ctx, IID_IDIRECTDRAWCLIPPER, RealAddr(0x4000)).unwrap();
        assert_eq!(out.wrapper().unwrap().interface(), IID_IDIRECTDRAWCLIPPER);
        let raw = wrap_out_param(&ctx, IID_IDIRECT3DMATERIAL, RealAddr(0x5000)).unwrap();
        assert_eq!(raw.real_address(), Some(RealAddr(0x5000)));
    }
}
