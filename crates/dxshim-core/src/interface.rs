//! Interface identities and COM status codes
//!
//! An [`InterfaceId`] is a GUID stored as a `u128` so it can be hashed and
//! compared without touching platform types. [`InterfaceFamily`] groups the
//! versioned variants of one abstract capability (`IDirectDraw` ..
//! `IDirectDraw7`); a wrapper belonging to a family can satisfy a request for
//! any of its members.

use std::fmt;

// ============================================================================
// InterfaceId
// ============================================================================

/// A COM interface identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(u128);

/// GUID as laid out in memory by COM (little-endian first three fields)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl InterfaceId {
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self(
            (data1 as u128) << 96
                | (data2 as u128) << 80
                | (data3 as u128) << 64
                | u64::from_be_bytes(data4) as u128,
        )
    }

    pub const fn to_raw(&self) -> RawGuid {
        let v = self.0;
        RawGuid {
            data1: (v >> 96) as u32,
            data2: (v >> 80) as u16,
            data3: (v >> 64) as u16,
            data4: (v as u64).to_be_bytes(),
        }
    }

    pub const fn from_raw(raw: &RawGuid) -> Self {
        Self::from_fields(raw.data1, raw.data2, raw.data3, raw.data4)
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.to_raw();
        let d = raw.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            raw.data1, raw.data2, raw.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match known::name_of(self) {
            Some(name) => write!(f, "{name}"),
            None => fmt::Display::fmt(self, f),
        }
    }
}

// ============================================================================
// HResult
// ============================================================================

/// COM status code returned across the real-object boundary
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: HResult = HResult(0);
    pub const E_NOINTERFACE: HResult = HResult(0x8000_4002_u32 as i32);
    pub const E_POINTER: HResult = HResult(0x8000_4003_u32 as i32);
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    pub const E_INVALIDARG: HResult = HResult(0x8007_0057_u32 as i32);

    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_err(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HRESULT(0x{:08X})", self.0 as u32)
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Families
// ============================================================================

/// One interface of a family, with the version its name carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceMember {
    pub id: InterfaceId,
    pub name: &'static str,
    pub version: u32,
}

impl InterfaceMember {
    pub const fn new(id: InterfaceId, name: &'static str, version: u32) -> Self {
        Self { id, name, version }
    }
}

/// Versioned variants of one abstract interface
#[derive(Debug)]
pub struct InterfaceFamily {
    pub name: &'static str,
    pub members: &'static [InterfaceMember],
}

impl InterfaceFamily {
    pub fn contains(&self, iid: &InterfaceId) -> bool {
        self.member(iid).is_some()
    }

    pub fn member(&self, iid: &InterfaceId) -> Option<&'static InterfaceMember> {
        self.members.iter().find(|m| m.id == *iid)
    }

    /// Interface version of `iid` (`IDirectDraw4` is 4)
    pub fn version_of(&self, iid: &InterfaceId) -> Option<u32> {
        self.member(iid).map(|m| m.version)
    }

    pub fn ids(&self) -> impl Iterator<Item = InterfaceId> + 'static {
        self.members.iter().map(|m| m.id)
    }
}

/// Identity a wrapper declares: its own id plus the family it can stand in for
#[derive(Debug, Clone, Copy)]
pub struct InterfaceKind {
    pub id: InterfaceId,
    pub family: &'static InterfaceFamily,
}

impl InterfaceKind {
    pub const fn new(id: InterfaceId, family: &'static InterfaceFamily) -> Self {
        Self { id, family }
    }

    /// Can a wrapper of this kind satisfy a request for `requested`
    pub fn is_compatible(&self, requested: &InterfaceId) -> bool {
        *requested == self.id || self.family.contains(requested)
    }
}

// ============================================================================
// Well-known identifiers
// ============================================================================

pub mod known {
    use super::{InterfaceFamily, InterfaceId, InterfaceMember};

    pub const IID_IUNKNOWN: InterfaceId =
        InterfaceId::from_fields(0x0000_0000, 0x0000, 0x0000, [0xC0, 0, 0, 0, 0, 0, 0, 0x46]);

    /// Probe answered with the real object pointer, reference count untouched
    pub const IID_GET_REAL_INTERFACE: InterfaceId = InterfaceId::from_fields(
        0x5C7A_DE54,
        0x2E1B,
        0x4E8F,
        [0x9A, 0x41, 0x3D, 0x07, 0xB2, 0x6C, 0x11, 0x01],
    );

    /// Probe answered with the wrapper itself, reference count untouched
    pub const IID_GET_INTERFACE_X: InterfaceId = InterfaceId::from_fields(
        0x5C7A_DE54,
        0x2E1B,
        0x4E8F,
        [0x9A, 0x41, 0x3D, 0x07, 0xB2, 0x6C, 0x11, 0x02],
    );

    pub const IID_IDIRECTDRAW: InterfaceId = InterfaceId::from_fields(
        0x6C14_DB80,
        0xA733,
        0x11CE,
        [0xA5, 0x21, 0x00, 0x20, 0xAF, 0x0B, 0xE5, 0x60],
    );
    pub const IID_IDIRECTDRAW2: InterfaceId = InterfaceId::from_fields(
        0xB3A6_F3E0,
        0x2B43,
        0x11CF,
        [0xA2, 0xDE, 0x00, 0xAA, 0x00, 0xB9, 0x33, 0x56],
    );
    pub const IID_IDIRECTDRAW3: InterfaceId = InterfaceId::from_fields(
        0x618F_8AD4,
        0x8B7A,
        0x11D0,
        [0x8F, 0xCC, 0x00, 0xC0, 0x4F, 0xD9, 0x18, 0x9D],
    );
    pub const IID_IDIRECTDRAW4: InterfaceId = InterfaceId::from_fields(
        0x9C59_509A,
        0x39BD,
        0x11D1,
        [0x8C, 0x4A, 0x00, 0xC0, 0x4F, 0xD9, 0x30, 0xC5],
    );
    pub const IID_IDIRECTDRAW7: InterfaceId = InterfaceId::from_fields(
        0x15E6_5EC0,
        0x3B9C,
        0x11D2,
        [0xB9, 0x2F, 0x00, 0x60, 0x97, 0x97, 0xEA, 0x5B],
    );
    pub const IID_IDIRECTDRAWCLIPPER: InterfaceId = InterfaceId::from_fields(
        0x6C14_DB85,
        0xA733,
        0x11CE,
        [0xA5, 0x21, 0x00, 0x20, 0xAF, 0x0B, 0xE5, 0x60],
    );
    pub const IID_IDIRECTDRAWCOLORCONTROL: InterfaceId = InterfaceId::from_fields(
        0x4B9F_0EE0,
        0x0D7E,
        0x11D0,
        [0x9B, 0x06, 0x00, 0xA0, 0xC9, 0x03, 0xA3, 0xB8],
    );
    pub const IID_IDIRECT3DMATERIAL: InterfaceId = InterfaceId::from_fields(
        0x4417_C144,
        0x33AD,
        0x11CF,
        [0x81, 0x6F, 0x00, 0x00, 0xC0, 0x20, 0x15, 0x6E],
    );
    pub const IID_IDIRECT3DMATERIAL2: InterfaceId = InterfaceId::from_fields(
        0x9328_1503,
        0x8CF8,
        0x11D0,
        [0x89, 0xAB, 0x00, 0xA0, 0xC9, 0x05, 0x41, 0x29],
    );
    pub const IID_IDIRECT3DMATERIAL3: InterfaceId = InterfaceId::from_fields(
        0xCA9C_46F4,
        0xD3C5,
        0x11D1,
        [0xB7, 0x5A, 0x00, 0x60, 0x08, 0x52, 0xB3, 0x12],
    );
    pub const IID_IDIRECT3DDEVICE9: InterfaceId = InterfaceId::from_fields(
        0xD022_3B96,
        0xBF7A,
        0x43FD,
        [0x92, 0xBD, 0xA4, 0x3B, 0x0D, 0x82, 0xB9, 0xEB],
    );
    pub const IID_IDIRECT3DDEVICE9EX: InterfaceId = InterfaceId::from_fields(
        0xB18B_10CE,
        0x2649,
        0x405A,
        [0x87, 0x0F, 0x95, 0xF7, 0x77, 0xD4, 0x31, 0x3A],
    );
    pub const IID_IDIRECTINPUTDEVICE8A: InterfaceId = InterfaceId::from_fields(
        0x54D4_1080,
        0xDC15,
        0x4833,
        [0xA4, 0x1B, 0x74, 0x8F, 0x73, 0xA3, 0x81, 0x79],
    );
    pub const IID_IDIRECTINPUTDEVICE8W: InterfaceId = InterfaceId::from_fields(
        0x54D4_1081,
        0xDC15,
        0x4833,
        [0xA4, 0x1B, 0x74, 0x8F, 0x73, 0xA3, 0x81, 0x79],
    );

    /// Interfaces a Direct3D9 device must never hand out through the shim
    pub const DEVICE9_REJECTED: [InterfaceId; 2] = [
        InterfaceId::from_fields(
            0x126D_0349,
            0x4787,
            0x4AA6,
            [0x8E, 0x1B, 0x40, 0xC1, 0x77, 0xC6, 0x0A, 0x01],
        ),
        InterfaceId::from_fields(
            0x6940_36AC,
            0x542A,
            0x4A3A,
            [0x9A, 0x32, 0x53, 0xBC, 0x20, 0x00, 0x2C, 0x1B],
        ),
    ];

    pub static DIRECTDRAW: InterfaceFamily = InterfaceFamily {
        name: "IDirectDraw",
        members: &[
            InterfaceMember::new(IID_IDIRECTDRAW, "IDirectDraw", 1),
            InterfaceMember::new(IID_IDIRECTDRAW2, "IDirectDraw2", 2),
            InterfaceMember::new(IID_IDIRECTDRAW3, "IDirectDraw3", 3),
            InterfaceMember::new(IID_IDIRECTDRAW4, "IDirectDraw4", 4),
            InterfaceMember::new(IID_IDIRECTDRAW7, "IDirectDraw7", 7),
        ],
    };

    pub static DIRECTDRAW_CLIPPER: InterfaceFamily = InterfaceFamily {
        name: "IDirectDrawClipper",
        members: &[InterfaceMember::new(IID_IDIRECTDRAWCLIPPER, "IDirectDrawClipper", 1)],
    };

    pub static DIRECTDRAW_COLOR_CONTROL: InterfaceFamily = InterfaceFamily {
        name: "IDirectDrawColorControl",
        members: &[InterfaceMember::new(IID_IDIRECTDRAWCOLORCONTROL, "IDirectDrawColorControl", 1)],
    };

    pub static DIRECT3D_MATERIAL: InterfaceFamily = InterfaceFamily {
        name: "IDirect3DMaterial",
        members: &[
            InterfaceMember::new(IID_IDIRECT3DMATERIAL, "IDirect3DMaterial", 1),
            InterfaceMember::new(IID_IDIRECT3DMATERIAL2, "IDirect3DMaterial2", 2),
            InterfaceMember::new(IID_IDIRECT3DMATERIAL3, "IDirect3DMaterial3", 3),
        ],
    };

    pub static DIRECT3D_DEVICE9: InterfaceFamily = InterfaceFamily {
        name: "IDirect3DDevice9",
        members: &[
            InterfaceMember::new(IID_IDIRECT3DDEVICE9, "IDirect3DDevice9", 9),
            InterfaceMember::new(IID_IDIRECT3DDEVICE9EX, "IDirect3DDevice9Ex", 9),
        ],
    };

    pub static DIRECTINPUT_DEVICE8: InterfaceFamily = InterfaceFamily {
        name: "IDirectInputDevice8",
        members: &[
            InterfaceMember::new(IID_IDIRECTINPUTDEVICE8A, "IDirectInputDevice8A", 8),
            InterfaceMember::new(IID_IDIRECTINPUTDEVICE8W, "IDirectInputDevice8W", 8),
        ],
    };

    pub static FAMILIES: [&InterfaceFamily; 6] = [
        &DIRECTDRAW,
        &DIRECTDRAW_CLIPPER,
        &DIRECTDRAW_COLOR_CONTROL,
        &DIRECT3D_MATERIAL,
        &DIRECT3D_DEVICE9,
        &DIRECTINPUT_DEVICE8,
    ];

    /// Human readable name for log output
    pub fn name_of(iid: &InterfaceId) -> Option<String> {
        if *iid == IID_IUNKNOWN {
            return Some("IUnknown".to_string());
        }
        if *iid == IID_GET_REAL_INTERFACE {
            return Some("GetRealInterface".to_string());
        }
        if *iid == IID_GET_INTERFACE_X {
            return Some("GetInterfaceX".to_string());
        }
        FAMILIES
            .iter()
            .find_map(|family| family.member(iid))
            .map(|member| member.name.to_string())
    }
}
