//! Detours over kernel32/user32/winmm exports

use std::ffi::{c_void, CStr};
use std::sync::OnceLock;

use retour::{Function, GenericDetour, HookableWith};
use windows::core::{PCSTR, PCWSTR};
use windows::Win32::Foundation::BOOL;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows::Win32::System::SystemInformation::{
    OSVERSIONINFOA, OSVERSIONINFOEXA, OSVERSIONINFOEXW, OSVERSIONINFOW,
};
use windows::Win32::System::Threading::{GetCurrentThread, QueryThreadCycleTime, Sleep};

use dxshim_common::CompatConfig;

use crate::busy_wait;
use crate::installed::{attach_all_or_none, FeatureOutcome, InstalledHooks};
use crate::profile::{ActiveLie, OsVersionInfo};
use crate::{Result, VersionHookError};

/// Install the hooks `config` asks for
///
/// The version lie and the busy-wait mitigation are installed independently.
/// Individual busy-wait hooks that cannot be placed are logged and skipped.
pub fn install(config: &CompatConfig) -> InstalledHooks {
    let mut installed = InstalledHooks::default();

    if let Some(name) = &config.win_version_lie {
        let outcome = ActiveLie::resolve(name, config.win_version_lie_sp).and_then(install_version_lie);
        installed.version_lie = match outcome {
            Ok(profile) => FeatureOutcome::Installed(profile),
            Err(e) => {
                tracing::error!("Version lie not installed: {}", e);
                FeatureOutcome::Failed(e.to_string())
            }
        };
    }

    if config.busy_wait_mitigation {
        busy_wait::set_threshold(config.thread_switch_cycle_time);
        installed.busy_wait = match install_busy_wait_hooks() {
            hooked if hooked.is_empty() => FeatureOutcome::Failed("no busy-wait export could be hooked".into()),
            hooked => FeatureOutcome::Installed(hooked),
        };
    }

    installed
}

/// Disable every detour placed by [`install`]
///
/// The detours stay allocated so a late call through a stale pointer still
/// reaches the original function. Returns the number of detours disabled.
pub fn uninstall() -> usize {
    let disabled = [
        disable(&GET_VERSION, "GetVersion"),
        disable(&GET_VERSION_EX_A, "GetVersionExA"),
        disable(&GET_VERSION_EX_W, "GetVersionExW"),
        disable(&GET_MESSAGE_A, "GetMessageA"),
        disable(&GET_MESSAGE_W, "GetMessageW"),
        disable(&PEEK_MESSAGE_A, "PeekMessageA"),
        disable(&PEEK_MESSAGE_W, "PeekMessageW"),
        disable(&GET_TICK_COUNT, "GetTickCount"),
        disable(&MSG_WAIT, "MsgWaitForMultipleObjects"),
        disable(&MSG_WAIT_EX, "MsgWaitForMultipleObjectsEx"),
        disable(&SIGNAL_AND_WAIT, "SignalObjectAndWait"),
        disable(&WAIT_SINGLE_EX, "WaitForSingleObjectEx"),
        disable(&WAIT_MULTIPLE_EX, "WaitForMultipleObjectsEx"),
        disable(&TIME_GET_TIME, "timeGetTime"),
    ]
    .into_iter()
    .filter(|&d| d)
    .count();
    tracing::info!("Disabled {} compatibility hook(s)", disabled);
    disabled
}

// ============================================================================
// Export lookup
// ============================================================================

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Address of `symbol` in `module`, loading the module if needed
unsafe fn export<F: Function>(module: &'static str, symbol: &'static CStr) -> Result<F> {
    let name = wide(module);
    let handle = match GetModuleHandleW(PCWSTR(name.as_ptr())) {
        Ok(handle) => handle,
        Err(_) => LoadLibraryW(PCWSTR(name.as_ptr())).map_err(|e| VersionHookError::MissingModule {
            module,
            reason: e.to_string(),
        })?,
    };
    let address = GetProcAddress(handle, PCSTR(symbol.as_ptr() as *const u8)).ok_or_else(|| {
        VersionHookError::MissingExport {
            module,
            symbol: symbol.to_string_lossy().into_owned(),
        }
    })?;
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of_val(&address));
    Ok(std::mem::transmute_copy(&address))
}

/// Detour `symbol` to `hook` and keep the detour in `slot`
fn attach<F: Function + HookableWith<F>>(
    slot: &'static OnceLock<GenericDetour<F>>,
    module: &'static str,
    symbol: &'static CStr,
    hook: F,
) -> Result<()> {
    let detour_error = |e: retour::Error| VersionHookError::Detour {
        symbol: symbol.to_string_lossy().into_owned(),
        reason: e.to_string(),
    };
    if let Some(detour) = slot.get() {
        if !detour.is_enabled() {
            unsafe { detour.enable() }.map_err(detour_error)?;
        }
        return Ok(());
    }

    unsafe {
        let target: F = export(module, symbol)?;
        let detour = GenericDetour::new(target, hook).map_err(detour_error)?;
        let detour = slot.get_or_init(|| detour);
        detour.enable().map_err(detour_error)?;
    }
    tracing::debug!("Hooked {}!{}", module, symbol.to_string_lossy());
    Ok(())
}

/// Disable the detour in `slot` if it is placed and enabled
fn disable<F: Function>(slot: &OnceLock<GenericDetour<F>>, symbol: &str) -> bool {
    let Some(detour) = slot.get() else {
        return false;
    };
    if !detour.is_enabled() {
        return false;
    }
    match unsafe { detour.disable() } {
        Ok(()) => {
            tracing::debug!("Unhooked {}", symbol);
            true
        }
        Err(e) => {
            tracing::warn!("Failed to unhook {}: {}", symbol, e);
            false
        }
    }
}

// ============================================================================
// Version lie
// ============================================================================

type FnGetVersion = unsafe extern "system" fn() -> u32;
type FnGetVersionExA = unsafe extern "system" fn(*mut OSVERSIONINFOA) -> BOOL;
type FnGetVersionExW = unsafe extern "system" fn(*mut OSVERSIONINFOW) -> BOOL;

static LIE: OnceLock<ActiveLie> = OnceLock::new();
static GET_VERSION: OnceLock<GenericDetour<FnGetVersion>> = OnceLock::new();
static GET_VERSION_EX_A: OnceLock<GenericDetour<FnGetVersionExA>> = OnceLock::new();
static GET_VERSION_EX_W: OnceLock<GenericDetour<FnGetVersionExW>> = OnceLock::new();

#[derive(Clone, Copy)]
enum VersionExport {
    GetVersion,
    GetVersionExA,
    GetVersionExW,
}

impl VersionExport {
    const ALL: [Self; 3] = [Self::GetVersion, Self::GetVersionExA, Self::GetVersionExW];

    fn attach(self) -> Result<()> {
        match self {
            Self::GetVersion => attach(&GET_VERSION, "kernel32.dll", c"GetVersion", get_version as FnGetVersion),
            Self::GetVersionExA => {
                attach(&GET_VERSION_EX_A, "kernel32.dll", c"GetVersionExA", get_version_ex_a as FnGetVersionExA)
            }
            Self::GetVersionExW => {
                attach(&GET_VERSION_EX_W, "kernel32.dll", c"GetVersionExW", get_version_ex_w as FnGetVersionExW)
            }
        }
    }

    fn detach(self) {
        match self {
            Self::GetVersion => disable(&GET_VERSION, "GetVersion"),
            Self::GetVersionExA => disable(&GET_VERSION_EX_A, "GetVersionExA"),
            Self::GetVersionExW => disable(&GET_VERSION_EX_W, "GetVersionExW"),
        };
    }
}

/// Hook all three version exports or none of them
fn install_version_lie(lie: ActiveLie) -> Result<&'static str> {
    let lie = *LIE.get_or_init(|| lie);
    tracing::info!(
        "Installing version lie hooks - os: {} sp: {}",
        lie.profile.name,
        lie.service_pack
    );
    attach_all_or_none(&VersionExport::ALL, |export| export.attach(), |export| export.detach())?;
    Ok(lie.profile.name)
}

unsafe extern "system" fn get_version() -> u32 {
    match (LIE.get(), GET_VERSION.get()) {
        (Some(lie), _) => lie.get_version(),
        (None, Some(original)) => original.call(),
        (None, None) => 0,
    }
}

unsafe extern "system" fn get_version_ex_a(info: *mut OSVERSIONINFOA) -> BOOL {
    let Some(original) = GET_VERSION_EX_A.get() else {
        return BOOL(0);
    };
    let result = original.call(info);
    if let (true, Some(lie), Some(info)) = (result.as_bool(), LIE.get(), info.as_mut()) {
        lie.apply(info);
    }
    result
}

unsafe extern "system" fn get_version_ex_w(info: *mut OSVERSIONINFOW) -> BOOL {
    let Some(original) = GET_VERSION_EX_W.get() else {
        return BOOL(0);
    };
    let result = original.call(info);
    if let (true, Some(lie), Some(info)) = (result.as_bool(), LIE.get(), info.as_mut()) {
        lie.apply(info);
    }
    result
}

impl OsVersionInfo for OSVERSIONINFOA {
    type Char = u8;
    const EX_SIZE: u32 = std::mem::size_of::<OSVERSIONINFOEXA>() as u32;

    fn declared_size(&self) -> u32 {
        self.dwOSVersionInfoSize
    }

    fn set_numbers(&mut self, major: u32, minor: u32, build: u32, platform: u32) {
        self.dwMajorVersion = major;
        self.dwMinorVersion = minor;
        self.dwBuildNumber = build;
        self.dwPlatformId = platform;
    }

    fn csd_version_mut(&mut self) -> &mut [u8] {
        &mut self.szCSDVersion
    }

    unsafe fn set_service_pack(&mut self, major: u16, minor: u16) {
        let ex = self as *mut Self as *mut OSVERSIONINFOEXA;
        (*ex).wServicePackMajor = major;
        (*ex).wServicePackMinor = minor;
    }
}

impl OsVersionInfo for OSVERSIONINFOW {
    type Char = u16;
    const EX_SIZE: u32 = std::mem::size_of::<OSVERSIONINFOEXW>() as u32;

    fn declared_size(&self) -> u32 {
        self.dwOSVersionInfoSize
    }

    fn set_numbers(&mut self, major: u32, minor: u32, build: u32, platform: u32) {
        self.dwMajorVersion = major;
        self.dwMinorVersion = minor;
        self.dwBuildNumber = build;
        self.dwPlatformId = platform;
    }

    fn csd_version_mut(&mut self) -> &mut [u16] {
        &mut self.szCSDVersion
    }

    unsafe fn set_service_pack(&mut self, major: u16, minor: u16) {
        let ex = self as *mut Self as *mut OSVERSIONINFOEXW;
        (*ex).wServicePackMajor = major;
        (*ex).wServicePackMinor = minor;
    }
}

// ============================================================================
// Busy-wait mitigation
// ============================================================================

fn thread_cycles() -> Option<u64> {
    let mut cycles = 0u64;
    unsafe { QueryThreadCycleTime(GetCurrentThread(), &mut cycles) }
        .ok()
        .map(|_| cycles)
}

fn mitigate_current_thread() {
    if let Some(now) = thread_cycles() {
        busy_wait::mitigate(busy_wait::threshold(), now, || unsafe { Sleep(0) });
    }
}

/// Declares the detour slot and replacement for one busy-wait prone export;
/// the replacement yields when due, then calls the original.
macro_rules! mitigate_busy_waiting {
    ($slot:ident, $hook:ident, fn($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        static $slot: OnceLock<GenericDetour<unsafe extern "system" fn($($ty),*) -> $ret>> = OnceLock::new();

        unsafe extern "system" fn $hook($($arg: $ty),*) -> $ret {
            mitigate_current_thread();
            match $slot.get() {
                Some(original) => original.call($($arg),*),
                None => <$ret>::default(),
            }
        }
    };
}

mitigate_busy_waiting!(GET_MESSAGE_A, get_message_a, fn(msg: *mut c_void, hwnd: *mut c_void, min: u32, max: u32) -> i32);
mitigate_busy_waiting!(GET_MESSAGE_W, get_message_w, fn(msg: *mut c_void, hwnd: *mut c_void, min: u32, max: u32) -> i32);
mitigate_busy_waiting!(PEEK_MESSAGE_A, peek_message_a, fn(msg: *mut c_void, hwnd: *mut c_void, min: u32, max: u32, remove: u32) -> i32);
mitigate_busy_waiting!(PEEK_MESSAGE_W, peek_message_w, fn(msg: *mut c_void, hwnd: *mut c_void, min: u32, max: u32, remove: u32) -> i32);
mitigate_busy_waiting!(GET_TICK_COUNT, get_tick_count, fn() -> u32);
mitigate_busy_waiting!(MSG_WAIT, msg_wait_for_multiple_objects, fn(count: u32, handles: *const *mut c_void, wait_all: i32, ms: u32, wake_mask: u32) -> u32);
mitigate_busy_waiting!(MSG_WAIT_EX, msg_wait_for_multiple_objects_ex, fn(count: u32, handles: *const *mut c_void, ms: u32, wake_mask: u32, flags: u32) -> u32);
mitigate_busy_waiting!(SIGNAL_AND_WAIT, signal_object_and_wait, fn(signal: *mut c_void, wait: *mut c_void, ms: u32, alertable: i32) -> u32);
mitigate_busy_waiting!(WAIT_SINGLE_EX, wait_for_single_object_ex, fn(handle: *mut c_void, ms: u32, alertable: i32) -> u32);
mitigate_busy_waiting!(WAIT_MULTIPLE_EX, wait_for_multiple_objects_ex, fn(count: u32, handles: *const *mut c_void, wait_all: i32, ms: u32, alertable: i32) -> u32);
mitigate_busy_waiting!(TIME_GET_TIME, time_get_time, fn() -> u32);

fn install_busy_wait_hooks() -> Vec<&'static str> {
    let attempts: [(&'static str, &'static CStr, Result<()>); 11] = [
        ("user32.dll", c"GetMessageA", attach(&GET_MESSAGE_A, "user32.dll", c"GetMessageA", get_message_a as _)),
        ("user32.dll", c"GetMessageW", attach(&GET_MESSAGE_W, "user32.dll", c"GetMessageW", get_message_w as _)),
        ("user32.dll", c"PeekMessageA", attach(&PEEK_MESSAGE_A, "user32.dll", c"PeekMessageA", peek_message_a as _)),
        ("user32.dll", c"PeekMessageW", attach(&PEEK_MESSAGE_W, "user32.dll", c"PeekMessageW", peek_message_w as _)),
        ("kernel32.dll", c"GetTickCount", attach(&GET_TICK_COUNT, "kernel32.dll", c"GetTickCount", get_tick_count as _)),
        (
            "user32.dll",
            c"MsgWaitForMultipleObjects",
            attach(&MSG_WAIT, "user32.dll", c"MsgWaitForMultipleObjects", msg_wait_for_multiple_objects as _),
        ),
        (
            "user32.dll",
            c"MsgWaitForMultipleObjectsEx",
            attach(&MSG_WAIT_EX, "user32.dll", c"MsgWaitForMultipleObjectsEx", msg_wait_for_multiple_objects_ex as _),
        ),
        (
            "kernel32.dll",
            c"SignalObjectAndWait",
            attach(&SIGNAL_AND_WAIT, "kernel32.dll", c"SignalObjectAndWait", signal_object_and_wait as _),
        ),
        (
            "kernel32.dll",
            c"WaitForSingleObjectEx",
            attach(&WAIT_SINGLE_EX, "kernel32.dll", c"WaitForSingleObjectEx", wait_for_single_object_ex as _),
        ),
        (
            "kernel32.dll",
            c"WaitForMultipleObjectsEx",
            attach(&WAIT_MULTIPLE_EX, "kernel32.dll", c"WaitForMultipleObjectsEx", wait_for_multiple_objects_ex as _),
        ),
        ("winmm.dll", c"timeGetTime", attach(&TIME_GET_TIME, "winmm.dll", c"timeGetTime", time_get_time as _)),
    ];

    let mut hooked = Vec::new();
    for (module, symbol, result) in attempts {
        match result {
            Ok(()) => hooked.push(symbol.to_str().unwrap_or("?")),
            Err(e) => {
                tracing::warn!("Busy-wait hook {}!{} not installed: {}", module, symbol.to_string_lossy(), e)
            }
        }
    }
    tracing::info!(
        "Busy-wait mitigation active on {} function(s), {} cycles per time slice",
        hooked.len(),
        busy_wait::threshold()
    );
    hooked
}
