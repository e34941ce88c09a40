//! DirectDraw wrapper DLL
//!
//! This DLL is a drop-in replacement for ddraw.dll. It loads the shim
//! configuration, installs the OS compatibility hooks, and forwards the
//! DirectDraw entry points to the real library in the system directory.
//!
//! Collaborating components reach the window-procedure interceptor through
//! the `DxShim*` exports.

pub mod forward;
pub mod runtime;

#[cfg(windows)]
pub use exports::*;

#[cfg(windows)]
mod exports {
    use std::ffi::c_void;

    use windows::core::{GUID, HRESULT};
    use windows::Win32::Foundation::{BOOL, E_FAIL, E_POINTER, FALSE, HINSTANCE, HWND, TRUE};
    use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    use dxshim_common::log_limit;
    use dxshim_wndproc::win32::registry;
    use dxshim_wndproc::Hwnd;

    use crate::{forward, runtime};

    fn handle(hwnd: HWND) -> Hwnd {
        Hwnd(hwnd.0 as usize)
    }

    /// DLL entry point
    #[no_mangle]
    #[allow(non_snake_case)]
    pub extern "system" fn DllMain(_hinst_dll: HINSTANCE, fdw_reason: u32, lpv_reserved: *mut c_void) -> BOOL {
        match fdw_reason {
            DLL_PROCESS_ATTACH => attach(),
            DLL_PROCESS_DETACH => detach(!lpv_reserved.is_null()),
            _ => {}
        }

        TRUE
    }

    fn attach() {
        let runtime = runtime::start();
        let installed = dxshim_version::hooks::install(&runtime.config().compat);
        if let Some(profile) = installed.version_lie.installed() {
            tracing::info!("Reporting Windows {} to the application", profile);
        }
        if installed.busy_wait.is_failed() {
            tracing::warn!("Busy-wait mitigation requested but not active");
        }
    }

    /// `process_exit` is set when the whole process is going away rather
    /// than the DLL being unloaded
    fn detach(process_exit: bool) {
        let removed = registry().remove_all(process_exit);
        if !process_exit {
            dxshim_version::hooks::uninstall();
        }
        if let Some(runtime) = runtime::get() {
            runtime.context().shutdown();
        }
        tracing::info!(
            "dxshim DirectDraw wrapper unloaded ({} window hook(s) removed)",
            removed
        );
    }

    // ========================================================================
    // DirectDraw entry points
    // ========================================================================

    type FnDirectDrawCreate = unsafe extern "system" fn(*mut GUID, *mut *mut c_void, *mut c_void) -> HRESULT;
    type FnDirectDrawCreateEx =
        unsafe extern "system" fn(*mut GUID, *mut *mut c_void, *const GUID, *mut c_void) -> HRESULT;
    type FnDirectDrawCreateClipper = unsafe extern "system" fn(u32, *mut *mut c_void, *mut c_void) -> HRESULT;
    type FnDirectDrawEnumerate = unsafe extern "system" fn(isize, *mut c_void) -> HRESULT;

    /// DirectDrawCreate - Main entry point for DirectDraw
    #[no_mangle]
    pub unsafe extern "system" fn DirectDrawCreate(
        lpguid: *mut GUID,
        lplpdd: *mut *mut c_void,
        punkouter: *mut c_void,
    ) -> HRESULT {
        tracing::debug!("DirectDrawCreate called");
        if lplpdd.is_null() {
            return E_POINTER;
        }
        match forward::resolve::<FnDirectDrawCreate>(c"DirectDrawCreate") {
            Some(real) => real(lpguid, lplpdd, punkouter),
            None => E_FAIL,
        }
    }

    /// DirectDrawCreateEx - Extended DirectDraw creation
    #[no_mangle]
    pub unsafe extern "system" fn DirectDrawCreateEx(
        lpguid: *mut GUID,
        lplpdd: *mut *mut c_void,
        iid: *const GUID,
        punkouter: *mut c_void,
    ) -> HRESULT {
        tracing::debug!("DirectDrawCreateEx called");
        if lplpdd.is_null() || iid.is_null() {
            return E_POINTER;
        }
        match forward::resolve::<FnDirectDrawCreateEx>(c"DirectDrawCreateEx") {
            Some(real) => real(lpguid, lplpdd, iid, punkouter),
            None => E_FAIL,
        }
    }

    #[no_mangle]
    pub unsafe extern "system" fn DirectDrawCreateClipper(
        flags: u32,
        lplpddclipper: *mut *mut c_void,
        punkouter: *mut c_void,
    ) -> HRESULT {
        if lplpddclipper.is_null() {
            return E_POINTER;
        }
        match forward::resolve::<FnDirectDrawCreateClipper>(c"DirectDrawCreateClipper") {
            Some(real) => real(flags, lplpddclipper, punkouter),
            None => E_FAIL,
        }
    }

    #[no_mangle]
    pub unsafe extern "system" fn DirectDrawEnumerateA(lpcallback: isize, lpcontext: *mut c_void) -> HRESULT {
        match forward::resolve::<FnDirectDrawEnumerate>(c"DirectDrawEnumerateA") {
            Some(real) => real(lpcallback, lpcontext),
            None => E_FAIL,
        }
    }

    #[no_mangle]
    pub unsafe extern "system" fn DirectDrawEnumerateW(lpcallback: isize, lpcontext: *mut c_void) -> HRESULT {
        match forward::resolve::<FnDirectDrawEnumerate>(c"DirectDrawEnumerateW") {
            Some(real) => real(lpcallback, lpcontext),
            None => E_FAIL,
        }
    }

    // ========================================================================
    // Window interceptor surface
    // ========================================================================

    /// Subclass `hwnd`; `primary_surface` enables activation tracking
    #[no_mangle]
    pub extern "system" fn DxShimHookWindow(hwnd: HWND, primary_surface: BOOL) -> BOOL {
        let enabled = runtime::get().map_or(true, |r| r.window_hooks_enabled());
        if !enabled {
            return FALSE;
        }
        match registry().install(handle(hwnd), primary_surface.as_bool()) {
            Ok(_) => TRUE,
            Err(e) => {
                log_limit!(dxshim_common::DEFAULT_LOG_LIMIT, warn, "Window hook failed: {}", e);
                FALSE
            }
        }
    }

    #[no_mangle]
    pub extern "system" fn DxShimUnhookWindow(hwnd: HWND) -> BOOL {
        registry().uninstall(handle(hwnd)).into()
    }

    /// Fill the minimized/disabled flags of a hooked window
    ///
    /// Returns FALSE for windows that are not hooked; the out-parameters are
    /// left untouched then.
    #[no_mangle]
    pub unsafe extern "system" fn DxShimGetWindowState(
        hwnd: HWND,
        minimized: *mut BOOL,
        disabled: *mut BOOL,
    ) -> BOOL {
        let Some(state) = registry().window_state(handle(hwnd)) else {
            return FALSE;
        };
        if let Some(out) = minimized.as_mut() {
            *out = state.minimized.into();
        }
        if let Some(out) = disabled.as_mut() {
            *out = state.disabled.into();
        }
        TRUE
    }

    /// Handler that must stay installed when the application tries to set
    /// `new_proc` on a hooked window, or 0 to let the change through
    #[no_mangle]
    pub extern "system" fn DxShimCheckWindowProc(hwnd: HWND, new_proc: usize) -> usize {
        registry().check_wnd_proc(handle(hwnd), new_proc).unwrap_or(0)
    }
}
