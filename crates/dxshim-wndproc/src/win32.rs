//! Win32 backing for the hook registry

use std::ffi::c_void;
use std::sync::OnceLock;

use windows::Win32::Foundation::{GetLastError, SetLastError, HWND, LPARAM, LRESULT, WIN32_ERROR, WPARAM};
use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ,
    PAGE_PROTECTION_FLAGS, PAGE_READWRITE,
};
use windows::Win32::System::Threading::GetCurrentProcess;
use windows::Win32::UI::WindowsAndMessaging::{
    CallWindowProcA, CallWindowProcW, DefWindowProcA, DefWindowProcW, IsIconic, IsWindow, IsWindowUnicode,
    GWLP_WNDPROC, WNDPROC,
};

use crate::registry::{dispatch_raw, HookRecord, Hwnd, Thunk, ThunkAllocator, WindowSystem, WndProcRegistry};
use crate::thunk::{self, ThunkArch};
use crate::{HookError, Result};

fn hwnd(h: Hwnd) -> HWND {
    HWND(h.0 as *mut c_void)
}

/// `WindowSystem` over user32
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Windows;

impl Win32Windows {
    #[cfg(target_pointer_width = "64")]
    unsafe fn get_proc(h: HWND, unicode: bool) -> usize {
        use windows::Win32::UI::WindowsAndMessaging::{GetWindowLongPtrA, GetWindowLongPtrW};
        (if unicode {
            GetWindowLongPtrW(h, GWLP_WNDPROC)
        } else {
            GetWindowLongPtrA(h, GWLP_WNDPROC)
        }) as usize
    }

    #[cfg(target_pointer_width = "32")]
    unsafe fn get_proc(h: HWND, unicode: bool) -> usize {
        use windows::Win32::UI::WindowsAndMessaging::{GetWindowLongA, GetWindowLongW};
        (if unicode {
            GetWindowLongW(h, GWLP_WNDPROC)
        } else {
            GetWindowLongA(h, GWLP_WNDPROC)
        }) as u32 as usize
    }

    #[cfg(target_pointer_width = "64")]
    unsafe fn set_proc(h: HWND, unicode: bool, proc_addr: usize) -> usize {
        use windows::Win32::UI::WindowsAndMessaging::{SetWindowLongPtrA, SetWindowLongPtrW};
        (if unicode {
            SetWindowLongPtrW(h, GWLP_WNDPROC, proc_addr as isize)
        } else {
            SetWindowLongPtrA(h, GWLP_WNDPROC, proc_addr as isize)
        }) as usize
    }

    #[cfg(target_pointer_width = "32")]
    unsafe fn set_proc(h: HWND, unicode: bool, proc_addr: usize) -> usize {
        use windows::Win32::UI::WindowsAndMessaging::{SetWindowLongA, SetWindowLongW};
        (if unicode {
            SetWindowLongW(h, GWLP_WNDPROC, proc_addr as i32)
        } else {
            SetWindowLongA(h, GWLP_WNDPROC, proc_addr as i32)
        }) as u32 as usize
    }
}

impl WindowSystem for Win32Windows {
    fn is_window(&self, h: Hwnd) -> bool {
        unsafe { IsWindow(hwnd(h)).as_bool() }
    }

    fn is_unicode(&self, h: Hwnd) -> bool {
        unsafe { IsWindowUnicode(hwnd(h)).as_bool() }
    }

    fn is_iconic(&self, h: Hwnd) -> bool {
        unsafe { IsIconic(hwnd(h)).as_bool() }
    }

    fn window_proc(&self, h: Hwnd) -> Option<usize> {
        let proc_addr = unsafe { Self::get_proc(hwnd(h), self.is_unicode(h)) };
        (proc_addr != 0).then_some(proc_addr)
    }

    fn set_window_proc(&self, h: Hwnd, proc_addr: usize) -> bool {
        unsafe {
            // A zero return is only an error when the last-error code says so
            SetLastError(WIN32_ERROR(0));
            let previous = Self::set_proc(hwnd(h), self.is_unicode(h), proc_addr);
            previous != 0 || GetLastError() == WIN32_ERROR(0)
        }
    }

    fn call_window_proc(
        &self,
        proc_addr: usize,
        h: Hwnd,
        msg: u32,
        wparam: usize,
        lparam: isize,
        unicode: bool,
    ) -> isize {
        unsafe {
            let proc_fn: WNDPROC = std::mem::transmute::<usize, WNDPROC>(proc_addr);
            let result = if unicode {
                CallWindowProcW(proc_fn, hwnd(h), msg, WPARAM(wparam), LPARAM(lparam))
            } else {
                CallWindowProcA(proc_fn, hwnd(h), msg, WPARAM(wparam), LPARAM(lparam))
            };
            result.0
        }
    }

    fn def_window_proc(&self, h: Hwnd, msg: u32, wparam: usize, lparam: isize, unicode: bool) -> isize {
        unsafe {
            let result = if unicode {
                DefWindowProcW(hwnd(h), msg, WPARAM(wparam), LPARAM(lparam))
            } else {
                DefWindowProcA(hwnd(h), msg, WPARAM(wparam), LPARAM(lparam))
            };
            result.0
        }
    }
}

// ============================================================================
// Executable trampolines
// ============================================================================

/// Trampoline in its own execute-read pages
#[derive(Debug)]
pub struct ExecutableThunk {
    base: *mut c_void,
    len: usize,
}

// The pages are immutable after construction.
unsafe impl Send for ExecutableThunk {}

impl Thunk for ExecutableThunk {
    fn entry(&self) -> usize {
        self.base as usize
    }
}

impl Drop for ExecutableThunk {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = VirtualFree(self.base, 0, MEM_RELEASE) {
                tracing::warn!("VirtualFree of trampoline at {:p} failed: {}", self.base, e);
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutableThunks;

impl ThunkAllocator for ExecutableThunks {
    type Thunk = ExecutableThunk;

    fn allocate(&self, context: usize) -> Result<ExecutableThunk> {
        let code = thunk::encode(ThunkArch::native(), context as u64, trampoline_target as usize as u64)?;

        unsafe {
            let base = VirtualAlloc(None, code.len(), MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
            if base.is_null() {
                return Err(HookError::ThunkAlloc(format!("VirtualAlloc failed: {:?}", GetLastError())));
            }
            let thunk = ExecutableThunk { base, len: code.len() };

            std::ptr::copy_nonoverlapping(code.as_ptr(), base as *mut u8, code.len());

            let mut old = PAGE_PROTECTION_FLAGS(0);
            VirtualProtect(base, thunk.len, PAGE_EXECUTE_READ, &mut old)
                .map_err(|e| HookError::Protect(e.to_string()))?;
            FlushInstructionCache(GetCurrentProcess(), Some(base), thunk.len)
                .map_err(|e| HookError::Protect(e.to_string()))?;

            Ok(thunk)
        }
    }
}

/// The fixed function every trampoline calls
unsafe extern "system" fn trampoline_target(
    h: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    record: *const HookRecord,
) -> LRESULT {
    LRESULT(dispatch_raw(&Win32Windows, record, Hwnd(h.0 as usize), msg, wparam.0, lparam.0))
}

// ============================================================================
// Process-wide registry
// ============================================================================

pub type Win32Registry = WndProcRegistry<Win32Windows, ExecutableThunks>;

static REGISTRY: OnceLock<Win32Registry> = OnceLock::new();

pub fn registry() -> &'static Win32Registry {
    REGISTRY.get_or_init(|| WndProcRegistry::new(Win32Windows, ExecutableThunks))
}
