//! Per-device shared state
//!
//! Several wrapper instances can alias one underlying Direct3D device (a
//! `IDirect3DDevice9` and a `IDirect3DDevice9Ex` handed out for the same
//! object, for example). Driver state that is expensive to query is cached
//! once per [`DeviceKey`] and shared between them.
//!
//! Each aliasing instance marks itself in the slot's instance map. The state
//! is dropped when the last instance detaches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dxshim_common::GraphicsConfig;

/// Identifies one logical device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey(pub u32);

/// Identifies one wrapper instance aliasing a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    pub fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Cached state
// ============================================================================

/// Subset of the driver capabilities the shim acts on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    pub device_type: u32,
    pub max_anisotropy: u32,
    pub max_user_clip_planes: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultisampleSettings {
    pub enabled: bool,
    pub sample_type: u32,
    pub quality: u32,
    pub ssaa: bool,
}

pub const MAX_CLIP_PLANES: usize = 6;

/// Frame pacing counters
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    pub frames: u64,
    pub last_present: Option<Instant>,
}

impl FrameCounter {
    /// Time still to wait before the next present may go out
    pub fn remaining(&self, fps: f64, now: Instant) -> Option<Duration> {
        if fps <= 0.0 || !fps.is_finite() {
            return None;
        }
        let last = self.last_present?;
        let frame = Duration::from_secs_f64(1.0 / fps);
        let elapsed = now.checked_duration_since(last)?;
        if elapsed.is_zero() || elapsed >= frame {
            return None;
        }
        Some(frame - elapsed)
    }

    /// Count a frame, spin-yield until the frame budget has elapsed, then
    /// stamp the present time.
    pub fn limit(&mut self, fps: f64) {
        self.frames += 1;
        while self.remaining(fps, Instant::now()).is_some() {
            std::thread::yield_now();
        }
        self.last_present = Some(Instant::now());
    }
}

/// Driver state shared by every wrapper aliasing one device
#[derive(Debug, Clone, Default)]
pub struct DeviceSharedState {
    pub caps: Option<DeviceCaps>,
    pub max_anisotropy: u32,
    pub anisotropy_set: bool,
    pub anisotropy_disabled: bool,
    pub clip_planes: [Option<[f32; 4]>; MAX_CLIP_PLANES],
    pub clip_plane_render_state: u32,
    pub multisample: MultisampleSettings,
    pub counter: FrameCounter,
    pub device_window: usize,
    pub screen_size: (u32, u32),
}

impl DeviceSharedState {
    /// Fill the capability cache on first use
    ///
    /// Returns true when `query` ran. A failed query leaves the cache empty
    /// so the next call retries.
    pub fn ensure_caps<F>(&mut self, graphics: &GraphicsConfig, query: F) -> bool
    where
        F: FnOnce() -> Option<DeviceCaps>,
    {
        if self.caps.is_some() {
            return false;
        }
        match query() {
            Some(caps) => {
                self.max_anisotropy =
                    resolve_max_anisotropy(graphics.anisotropic_filtering, caps.max_anisotropy);
                self.caps = Some(caps);
            }
            None => {
                dxshim_common::log_limit!(
                    dxshim_common::DEFAULT_LOG_LIMIT,
                    warn,
                    "failed to query device caps"
                );
            }
        }
        true
    }

    /// Remember a clip plane so it can be re-applied before draws
    pub fn set_clip_plane(&mut self, index: usize, plane: [f32; 4]) -> bool {
        match self.clip_planes.get_mut(index) {
            Some(slot) => {
                *slot = Some(plane);
                true
            }
            None => false,
        }
    }

    pub fn clip_plane(&self, index: usize) -> Option<[f32; 4]> {
        self.clip_planes.get(index).copied().flatten()
    }

    pub fn has_clip_planes(&self) -> bool {
        self.clip_planes.iter().any(Option::is_some)
    }

    /// Clip planes enabled by the cached render-state mask
    pub fn enabled_clip_planes(&self) -> impl Iterator<Item = (usize, [f32; 4])> + '_ {
        self.clip_planes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.clip_plane_render_state & (1 << i) != 0)
            .filter_map(|(i, p)| p.map(|p| (i, p)))
    }

    /// Multisampling was rejected by the driver; fall back to none
    pub fn disable_multisample(&mut self) {
        self.multisample = MultisampleSettings::default();
    }

    /// Forget everything a device reset invalidates
    pub fn clear_vars(&mut self) {
        self.caps = None;
        self.max_anisotropy = 0;
        self.anisotropy_set = false;
        self.anisotropy_disabled = false;
        self.clip_planes = [None; MAX_CLIP_PLANES];
        self.clip_plane_render_state = 0;
    }
}

/// Anisotropy level to force: 1 means "driver maximum", anything else is
/// capped by the driver maximum, 0 disables the override.
pub fn resolve_max_anisotropy(configured: u32, driver_max: u32) -> u32 {
    match configured {
        0 => 0,
        1 => driver_max,
        n => n.min(driver_max),
    }
}

// ============================================================================
// DeviceStates
// ============================================================================

pub type SharedDevice = Arc<Mutex<DeviceSharedState>>;

struct DeviceSlot {
    state: SharedDevice,
    instances: HashMap<InstanceId, bool>,
}

/// All live device states, keyed by device
pub struct DeviceStates {
    slots: Mutex<HashMap<DeviceKey, DeviceSlot>>,
    next_key: AtomicU32,
}

impl DeviceStates {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_key: AtomicU32::new(1),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<DeviceKey, DeviceSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh key for a newly created device
    pub fn allocate_key(&self) -> DeviceKey {
        DeviceKey(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    /// Mark `instance` as aliasing `key`, creating the state on first use
    pub fn attach(&self, key: DeviceKey, instance: InstanceId) -> SharedDevice {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_insert_with(|| {
            tracing::debug!("Creating shared state for device {:?}", key);
            DeviceSlot {
                state: Arc::new(Mutex::new(DeviceSharedState::default())),
                instances: HashMap::new(),
            }
        });
        slot.instances.insert(instance, true);
        slot.state.clone()
    }

    /// Mark `instance` as gone; returns true when this destroyed the state
    pub fn detach(&self, key: DeviceKey, instance: InstanceId) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&key) else {
            return false;
        };
        if let Some(alive) = slot.instances.get_mut(&instance) {
            *alive = false;
        }
        if slot.instances.values().any(|alive| *alive) {
            return false;
        }
        slots.remove(&key);
        tracing::debug!("Destroyed shared state for device {:?}", key);
        true
    }

    pub fn get(&self, key: DeviceKey) -> Option<SharedDevice> {
        self.slots().get(&key).map(|slot| slot.state.clone())
    }

    pub fn contains(&self, key: DeviceKey) -> bool {
        self.slots().contains_key(&key)
    }

    /// Instances currently marked alive for `key`
    pub fn live_instances(&self, key: DeviceKey) -> usize {
        self.slots()
            .get(&key)
            .map_or(0, |slot| slot.instances.values().filter(|a| **a).count())
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots().clear();
    }
}

impl Default for DeviceStates {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a shared device state, recovering from a poisoned lock
pub fn lock_state(state: &SharedDevice) -> MutexGuard<'_, DeviceSharedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
