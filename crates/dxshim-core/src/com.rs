//! `RealObject` over a raw COM interface pointer
//!
//! Interface object layout: `[vtable_ptr, ...]`, vtable slots
//! `[0]QueryInterface [1]AddRef [2]Release`.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::identity::RealAddr;
use crate::interface::{HResult, InterfaceId, RawGuid};
use crate::proxy::RealObject;

type QueryInterfaceFn = unsafe extern "system" fn(*mut c_void, *const RawGuid, *mut *mut c_void) -> i32;
type RefCountFn = unsafe extern "system" fn(*mut c_void) -> u32;

/// A real interface pointer, called through its vtable
///
/// Holding a `ComObject` does not own a reference; the proxy forwards
/// AddRef/Release explicitly.
#[derive(Debug)]
pub struct ComObject {
    ptr: NonNull<c_void>,
}

// COM objects handed to the shim are free-threaded or apartment-agnostic;
// the pointer itself is only an address.
unsafe impl Send for ComObject {}
unsafe impl Sync for ComObject {}

impl ComObject {
    /// # Safety
    /// `ptr` must be null or point to a live COM interface whose first
    /// three vtable slots are the IUnknown methods.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    /// # Safety
    /// Same contract as [`ComObject::from_raw`].
    pub unsafe fn from_addr(addr: RealAddr) -> Option<Self> {
        Self::from_raw(addr.as_ptr())
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    unsafe fn slot(&self, index: usize) -> *const c_void {
        let vtable = *(self.ptr.as_ptr() as *const *const *const c_void);
        *vtable.add(index)
    }
}

impl RealObject for ComObject {
    fn address(&self) -> RealAddr {
        RealAddr::from_ptr(self.ptr.as_ptr())
    }

    fn query_interface(&self, iid: &InterfaceId) -> Result<RealAddr, HResult> {
        let guid = iid.to_raw();
        let mut out: *mut c_void = std::ptr::null_mut();
        let hr = unsafe {
            let qi: QueryInterfaceFn = std::mem::transmute(self.slot(0));
            HResult(qi(self.ptr.as_ptr(), &guid, &mut out))
        };
        if hr.is_err() {
            return Err(hr);
        }
        if out.is_null() {
            return Err(HResult::E_POINTER);
        }
        Ok(RealAddr::from_ptr(out))
    }

    fn add_ref(&self) -> u32 {
        unsafe {
            let add_ref: RefCountFn = std::mem::transmute(self.slot(1));
            add_ref(self.ptr.as_ptr())
        }
    }

    fn release(&self) -> u32 {
        unsafe {
            let release: RefCountFn = std::mem::transmute(self.slot(2));
            release(self.ptr.as_ptr())
        }
    }
}
