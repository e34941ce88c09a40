//! Trampoline encoder
//!
//! A trampoline is a tiny window procedure that appends one extra argument
//! (the hook record) and calls a fixed dispatch function:
//!
//! ```text
//! LRESULT thunk(hwnd, msg, wparam, lparam)
//!     => dispatch(hwnd, msg, wparam, lparam, context)
//! ```
//!
//! Encoding is pure; the platform allocator copies the bytes into fresh
//! pages and flips them to execute-read.

use std::fmt;
use std::str::FromStr;

use crate::{HookError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThunkArch {
    /// 32-bit stdcall
    X86,
    /// Windows x64 calling convention
    X64,
}

impl ThunkArch {
    /// Architecture of the running build
    pub const fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            ThunkArch::X64
        } else {
            ThunkArch::X86
        }
    }

    /// Encoded size in bytes
    pub const fn code_len(self) -> usize {
        match self {
            ThunkArch::X86 => X86_LEN,
            ThunkArch::X64 => X64_LEN,
        }
    }
}

impl fmt::Display for ThunkArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThunkArch::X86 => "x86",
            ThunkArch::X64 => "x64",
        })
    }
}

impl FromStr for ThunkArch {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "i686" | "win32" => Ok(ThunkArch::X86),
            "x64" | "x86_64" | "amd64" => Ok(ThunkArch::X64),
            _ => Err(HookError::UnknownArch(s.to_string())),
        }
    }
}

const X86_LEN: usize = 33;
const X64_LEN: usize = 36;

/// Encode a trampoline passing `context` as the fifth argument to `target`
pub fn encode(arch: ThunkArch, context: u64, target: u64) -> Result<Vec<u8>> {
    match arch {
        ThunkArch::X86 => {
            let context = narrow("context", context)?;
            let target = narrow("target", target)?;
            Ok(encode_x86(context, target))
        }
        ThunkArch::X64 => Ok(encode_x64(context, target)),
    }
}

fn narrow(what: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| HookError::AddressOutOfRange { what, value })
}

fn encode_x86(context: u32, target: u32) -> Vec<u8> {
    let mut code = Vec::with_capacity(X86_LEN);
    code.extend_from_slice(&[0x55]); // push ebp
    code.extend_from_slice(&[0x8B, 0xEC]); // mov ebp, esp
    code.push(0x68); // push context
    code.extend_from_slice(&context.to_le_bytes());
    code.extend_from_slice(&[0xFF, 0x75, 0x14]); // push [ebp+14h] lparam
    code.extend_from_slice(&[0xFF, 0x75, 0x10]); // push [ebp+10h] wparam
    code.extend_from_slice(&[0xFF, 0x75, 0x0C]); // push [ebp+0Ch] msg
    code.extend_from_slice(&[0xFF, 0x75, 0x08]); // push [ebp+08h] hwnd
    code.push(0xB8); // mov eax, target
    code.extend_from_slice(&target.to_le_bytes());
    code.extend_from_slice(&[0xFF, 0xD0]); // call eax
    code.extend_from_slice(&[0x8B, 0xE5]); // mov esp, ebp
    code.extend_from_slice(&[0x5D]); // pop ebp
    code.extend_from_slice(&[0xC2, 0x10, 0x00]); // ret 10h
    code
}

fn encode_x64(context: u64, target: u64) -> Vec<u8> {
    // rcx, rdx, r8 and r9 already hold the first four arguments
    let mut code = Vec::with_capacity(X64_LEN);
    code.extend_from_slice(&[0x48, 0x83, 0xEC, 0x38]); // sub rsp, 38h
    code.extend_from_slice(&[0x48, 0xB8]); // mov rax, context
    code.extend_from_slice(&context.to_le_bytes());
    code.extend_from_slice(&[0x48, 0x89, 0x44, 0x24, 0x20]); // mov [rsp+20h], rax
    code.extend_from_slice(&[0x48, 0xB8]); // mov rax, target
    code.extend_from_slice(&target.to_le_bytes());
    code.extend_from_slice(&[0xFF, 0xD0]); // call rax
    code.extend_from_slice(&[0x48, 0x83, 0xC4, 0x38]); // add rsp, 38h
    code.push(0xC3); // ret
    code
}

/// Hex dump, 16 bytes per line
pub fn hex_dump(code: &[u8]) -> String {
    code.chunks(16)
        .map(|line| {
            line.iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
