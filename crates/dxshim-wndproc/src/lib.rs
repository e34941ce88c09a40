//! Window-procedure interception
//!
//! Subclasses a window by swapping its procedure for a generated trampoline
//! that calls [`registry::HookRecord::dispatch`] with the hook record
//! appended. The original procedure always runs, with its result passed back
//! unchanged; the interceptor only observes activation, minimize and close
//! transitions on the way through.
//!
//! ```text
//! Unhooked --install--> Hooked --close message--> Inactive --sweep/uninstall--> Removed
//! ```

pub mod messages;
pub mod registry;
pub mod thunk;

#[cfg(windows)]
pub mod win32;

use thiserror::Error;

pub use registry::{HookRecord, Hwnd, Thunk, ThunkAllocator, WindowState, WindowSystem, WndProcRegistry};
pub use thunk::ThunkArch;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("{0:?} is not a window")]
    InvalidWindow(Hwnd),

    #[error("could not read the window procedure of {0:?}")]
    NoWindowProc(Hwnd),

    #[error("could not replace the window procedure of {0:?}")]
    SetWindowProc(Hwnd),

    #[error("trampoline allocation failed: {0}")]
    ThunkAlloc(String),

    #[error("could not make trampoline executable: {0}")]
    Protect(String),

    #[error("{what} address {value:#x} does not fit a 32-bit trampoline")]
    AddressOutOfRange { what: &'static str, value: u64 },

    #[error("unknown trampoline architecture: {0}")]
    UnknownArch(String),
}

pub type Result<T> = std::result::Result<T, HookError>;
