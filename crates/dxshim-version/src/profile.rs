//! Windows version profiles
//!
//! Old installers and games refuse to run on anything newer than the system
//! they were tested on. A profile holds the exact `GetVersion` dword, build
//! number and platform id a given release reported.

use std::fmt;

use crate::{Result, VersionHookError};

/// `VER_PLATFORM_WIN32_WINDOWS`
pub const PLATFORM_WIN32_WINDOWS: u32 = 1;
/// `VER_PLATFORM_WIN32_NT`
pub const PLATFORM_WIN32_NT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionLie {
    pub name: &'static str,
    /// Raw `GetVersion` result: major in the low byte, minor in the next
    pub version: u32,
    pub build: u32,
    pub platform: u32,
}

pub static PROFILES: [VersionLie; 5] = [
    VersionLie {
        name: "95",
        version: 0xC3B6_0004,
        build: 0x3B6,
        platform: PLATFORM_WIN32_WINDOWS,
    },
    VersionLie {
        name: "nt4",
        version: 0x0565_0004,
        build: 0x565,
        platform: PLATFORM_WIN32_NT,
    },
    VersionLie {
        name: "98",
        version: 0xC000_0A04,
        build: 0x040A_08AE,
        platform: PLATFORM_WIN32_WINDOWS,
    },
    VersionLie {
        name: "2000",
        version: 0x0893_0005,
        build: 0x893,
        platform: PLATFORM_WIN32_NT,
    },
    VersionLie {
        name: "xp",
        version: 0x0A28_0105,
        build: 0xA28,
        platform: PLATFORM_WIN32_NT,
    },
];

impl VersionLie {
    pub fn by_name(name: &str) -> Option<&'static VersionLie> {
        PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }

    pub const fn major(&self) -> u32 {
        self.version & 0xFF
    }

    pub const fn minor(&self) -> u32 {
        (self.version & 0xFF00) >> 8
    }

    pub fn platform_name(&self) -> &'static str {
        match self.platform {
            PLATFORM_WIN32_WINDOWS => "Win32 Windows",
            PLATFORM_WIN32_NT => "Win32 NT",
            _ => "unknown",
        }
    }
}

impl fmt::Display for VersionLie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<5} {}.{} build {} ({})",
            self.name,
            self.major(),
            self.minor(),
            self.build & 0xFFFF,
            self.platform_name()
        )
    }
}

/// `OSVERSIONINFO`-shaped structure the lie is written into
pub trait OsVersionInfo {
    type Char: Copy + Default + From<u8>;

    /// Size of the extended (`...EX`) layout
    const EX_SIZE: u32;

    /// `dwOSVersionInfoSize` as the caller filled it in
    fn declared_size(&self) -> u32;

    fn set_numbers(&mut self, major: u32, minor: u32, build: u32, platform: u32);

    fn csd_version_mut(&mut self) -> &mut [Self::Char];

    /// # Safety
    /// Only valid when the caller's buffer has the extended layout, i.e.
    /// `declared_size() >= EX_SIZE`.
    unsafe fn set_service_pack(&mut self, major: u16, minor: u16);
}

/// A resolved profile plus the service pack to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveLie {
    pub profile: &'static VersionLie,
    pub service_pack: u32,
}

impl ActiveLie {
    pub fn resolve(name: &str, service_pack: u32) -> Result<Self> {
        let profile =
            VersionLie::by_name(name).ok_or_else(|| VersionHookError::UnknownProfile(name.to_string()))?;
        Ok(Self { profile, service_pack })
    }

    /// Value `GetVersion` returns
    pub fn get_version(&self) -> u32 {
        self.profile.version
    }

    /// `szCSDVersion` text, empty without a service pack
    pub fn csd_version(&self) -> String {
        match self.service_pack {
            0 => String::new(),
            sp => format!("Service Pack {sp}"),
        }
    }

    /// Overwrite what the real `GetVersionEx` reported
    pub fn apply<V: OsVersionInfo>(&self, info: &mut V) {
        let p = self.profile;
        info.set_numbers(p.major(), p.minor(), p.build, p.platform);

        if self.service_pack == 0 {
            return;
        }
        fill_csd(info.csd_version_mut(), &self.csd_version());
        if info.declared_size() >= V::EX_SIZE {
            let sp = u16::try_from(self.service_pack).unwrap_or(u16::MAX);
            unsafe { info.set_service_pack(sp, 0) };
        }
    }
}

/// Zero `buf` and copy the ASCII `text` in, keeping a terminator
pub fn fill_csd<C: Copy + Default + From<u8>>(buf: &mut [C], text: &str) {
    buf.fill(C::default());
    let room = buf.len().saturating_sub(1);
    for (slot, byte) in buf.iter_mut().zip(text.bytes().take(room)) {
        *slot = C::from(byte);
    }
}
