//! Pass-through to the system DirectDraw library

/// `<dir>\<name>` as a NUL-terminated wide string
pub fn system_library_path(dir: &[u16], name: &str) -> Vec<u16> {
    let mut path = dir.to_vec();
    if !matches!(path.last(), Some(&c) if c == u16::from(b'\\') || c == u16::from(b'/')) {
        path.push(u16::from(b'\\'));
    }
    path.extend(name.encode_utf16());
    path.push(0);
    path
}

#[cfg(windows)]
pub use system::{resolve, system_ddraw};

#[cfg(windows)]
mod system {
    use std::ffi::{c_void, CStr};
    use std::sync::OnceLock;

    use windows::core::{PCSTR, PCWSTR};
    use windows::Win32::Foundation::{HMODULE, MAX_PATH};
    use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
    use windows::Win32::System::SystemInformation::GetSystemDirectoryW;

    use super::system_library_path;

    // Module base as an integer so the cell is Sync
    static SYSTEM_DDRAW: OnceLock<Option<usize>> = OnceLock::new();

    /// The real ddraw.dll from the system directory, loaded on first use
    pub fn system_ddraw() -> Option<HMODULE> {
        SYSTEM_DDRAW
            .get_or_init(|| unsafe { load_system_library("ddraw.dll") })
            .map(|base| HMODULE(base as *mut c_void))
    }

    unsafe fn load_system_library(name: &str) -> Option<usize> {
        let mut dir = [0u16; MAX_PATH as usize];
        let len = GetSystemDirectoryW(Some(&mut dir)) as usize;
        if len == 0 || len >= dir.len() {
            tracing::error!("GetSystemDirectoryW failed, cannot locate the system {}", name);
            return None;
        }

        let path = system_library_path(&dir[..len], name);
        match LoadLibraryW(PCWSTR(path.as_ptr())) {
            Ok(module) => {
                tracing::info!("Loaded system {}", String::from_utf16_lossy(&path[..path.len() - 1]));
                Some(module.0 as usize)
            }
            Err(e) => {
                tracing::error!("Failed to load system {}: {}", name, e);
                None
            }
        }
    }

    /// Look up `symbol` in the system ddraw.dll as a function of type `F`
    ///
    /// # Safety
    /// `F` must be the export's exact function pointer type.
    pub unsafe fn resolve<F: Copy>(symbol: &CStr) -> Option<F> {
        let module = system_ddraw()?;
        let address = GetProcAddress(module, PCSTR(symbol.as_ptr() as *const u8));
        if address.is_none() {
            dxshim_common::log_limit!(10, warn, "System ddraw.dll has no {}", symbol.to_string_lossy());
        }
        address.map(|f| std::mem::transmute_copy(&f))
    }
}
