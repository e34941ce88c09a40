//! Per-window hook registry
//!
//! Each hooked window gets a [`HookRecord`] and a trampoline that passes the
//! record to [`HookRecord::dispatch`]. The registry owns both. Installing
//! sweeps records of windows that closed and no longer exist, and frees
//! retired trampolines once their window is gone and no dispatch is running
//! through them.
//!
//! Dispatch never takes the registry lock, so a window procedure that
//! re-enters the registry (by creating a window, for example) cannot
//! deadlock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dxshim_common::{log_limit, DEFAULT_LOG_LIMIT};

use crate::messages::{self, WA_ACTIVE, WA_INACTIVE, WM_ACTIVATE};
use crate::{HookError, Result};

/// Window handle as an opaque integer
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hwnd(pub usize);

impl Hwnd {
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Hwnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HWND(0x{:X})", self.0)
    }
}

// ============================================================================
// Platform seams
// ============================================================================

/// The window manager calls the registry needs
pub trait WindowSystem: Send + Sync {
    fn is_window(&self, hwnd: Hwnd) -> bool;
    fn is_unicode(&self, hwnd: Hwnd) -> bool;
    fn is_iconic(&self, hwnd: Hwnd) -> bool;

    /// Current window procedure address, `None` when it cannot be read
    fn window_proc(&self, hwnd: Hwnd) -> Option<usize>;

    /// Replace the window procedure; returns false on failure
    fn set_window_proc(&self, hwnd: Hwnd, proc_addr: usize) -> bool;

    fn call_window_proc(
        &self,
        proc_addr: usize,
        hwnd: Hwnd,
        msg: u32,
        wparam: usize,
        lparam: isize,
        unicode: bool,
    ) -> isize;

    fn def_window_proc(&self, hwnd: Hwnd, msg: u32, wparam: usize, lparam: isize, unicode: bool) -> isize;
}

/// Executable trampoline memory; dropping it releases the memory
pub trait Thunk: Send {
    fn entry(&self) -> usize;
}

pub trait ThunkAllocator: Send + Sync {
    type Thunk: Thunk;

    /// Trampoline calling the dispatch function with `context` appended
    fn allocate(&self, context: usize) -> Result<Self::Thunk>;
}

// ============================================================================
// HookRecord
// ============================================================================

/// Flags collaborators read for a hooked window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowState {
    pub minimized: bool,
    pub disabled: bool,
}

/// One interception of one window
pub struct HookRecord {
    hwnd: Hwnd,
    original: usize,
    thunk_entry: AtomicUsize,
    primary_surface: bool,
    minimized: AtomicBool,
    disabled: AtomicBool,
    active: AtomicBool,
    exiting: AtomicBool,
    /// Dispatches currently running through this record's trampoline
    in_flight: AtomicUsize,
}

/// Counts one dispatch for as long as it is on the stack
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl HookRecord {
    fn new(hwnd: Hwnd, original: usize, primary_surface: bool) -> Self {
        Self {
            hwnd,
            original,
            thunk_entry: AtomicUsize::new(0),
            primary_surface,
            minimized: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            active: AtomicBool::new(true),
            exiting: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn hwnd(&self) -> Hwnd {
        self.hwnd
    }

    /// Window procedure that was in place before the hook
    pub fn original(&self) -> usize {
        self.original
    }

    /// Address of the installed trampoline
    pub fn thunk_entry(&self) -> usize {
        self.thunk_entry.load(Ordering::Acquire)
    }

    pub fn is_primary_surface(&self) -> bool {
        self.primary_surface
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WindowState {
        WindowState {
            minimized: self.minimized.load(Ordering::Acquire),
            disabled: self.disabled.load(Ordering::Acquire),
        }
    }

    /// Number of dispatches of this record still on some call stack
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns true for the call that actually flipped the record
    fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Handle one message for the hooked window
    pub fn dispatch<W>(&self, system: &W, hwnd: Hwnd, msg: u32, wparam: usize, lparam: isize) -> isize
    where
        W: WindowSystem + ?Sized,
    {
        let _in_flight = InFlight::enter(&self.in_flight);
        if hwnd.is_null() {
            log_limit!(DEFAULT_LOG_LIMIT, warn, "window message {:#x} without a window handle", msg);
            return 0;
        }
        tracing::trace!("{:?} {:#x}", hwnd, msg);

        if self.primary_surface {
            let iconic = system.is_iconic(hwnd);
            if self.minimized.swap(iconic, Ordering::AcqRel) != iconic {
                tracing::debug!("{:?} minimized: {}", hwnd, iconic);
            }
            if msg == WM_ACTIVATE {
                match wparam {
                    WA_ACTIVE => self.disabled.store(false, Ordering::Release),
                    WA_INACTIVE => self.disabled.store(true, Ordering::Release),
                    _ => {}
                }
            }
        }

        let unicode = system.is_unicode(hwnd);
        let result = match self.original {
            0 => system.def_window_proc(hwnd, msg, wparam, lparam, unicode),
            original => system.call_window_proc(original, hwnd, msg, wparam, lparam, unicode),
        };

        if messages::is_closing(msg, wparam) && hwnd == self.hwnd && self.deactivate() {
            tracing::debug!(
                "{:?} closing on {}, hook inactive",
                hwnd,
                messages::name(msg).unwrap_or("?")
            );
        }

        result
    }
}

impl fmt::Debug for HookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRecord")
            .field("hwnd", &self.hwnd)
            .field("original", &format_args!("{:#x}", self.original))
            .field("thunk", &format_args!("{:#x}", self.thunk_entry()))
            .field("active", &self.is_active())
            .finish()
    }
}

/// Entry point for trampolines
///
/// Keeps the record alive for the duration of the call even if the hook is
/// removed from inside the window procedure.
///
/// # Safety
/// `record` must be null or the context pointer of a trampoline created by a
/// [`WndProcRegistry`] whose record has not been freed.
pub unsafe fn dispatch_raw<W>(
    system: &W,
    record: *const HookRecord,
    hwnd: Hwnd,
    msg: u32,
    wparam: usize,
    lparam: isize,
) -> isize
where
    W: WindowSystem + ?Sized,
{
    if record.is_null() {
        log_limit!(DEFAULT_LOG_LIMIT, error, "trampoline called without a hook record");
        return 0;
    }
    Arc::increment_strong_count(record);
    let record = Arc::from_raw(record);
    record.dispatch(system, hwnd, msg, wparam, lparam)
}

// ============================================================================
// WndProcRegistry
// ============================================================================

struct HookSlot<T> {
    record: Arc<HookRecord>,
    thunk: T,
}

struct Hooks<T> {
    live: Vec<HookSlot<T>>,
    /// Removed hooks whose trampoline may still be on a call stack or
    /// reachable through a window that still exists
    retired: Vec<HookSlot<T>>,
}

pub struct WndProcRegistry<W, A: ThunkAllocator> {
    system: W,
    allocator: A,
    hooks: Mutex<Hooks<A::Thunk>>,
}

impl<W: WindowSystem, A: ThunkAllocator> WndProcRegistry<W, A> {
    pub fn new(system: W, allocator: A) -> Self {
        Self {
            system,
            allocator,
            hooks: Mutex::new(Hooks {
                live: Vec::new(),
                retired: Vec::new(),
            }),
        }
    }

    pub fn system(&self) -> &W {
        &self.system
    }

    fn hooks(&self) -> MutexGuard<'_, Hooks<A::Thunk>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hook `hwnd`; a window that is already hooked is left as it is
    pub fn install(&self, hwnd: Hwnd, primary_surface: bool) -> Result<Arc<HookRecord>> {
        if hwnd.is_null() || !self.system.is_window(hwnd) {
            return Err(HookError::InvalidWindow(hwnd));
        }

        let mut hooks = self.hooks();
        self.sweep_locked(&mut hooks);

        if let Some(slot) = hooks
            .live
            .iter()
            .find(|s| s.record.hwnd == hwnd && s.record.is_active())
        {
            return Ok(slot.record.clone());
        }

        let original = match self.system.window_proc(hwnd) {
            Some(original) if original != 0 => original,
            _ => {
                log_limit!(DEFAULT_LOG_LIMIT, warn, "could not read window procedure of {:?}", hwnd);
                return Err(HookError::NoWindowProc(hwnd));
            }
        };

        let record = Arc::new(HookRecord::new(hwnd, original, primary_surface));
        let thunk = self.allocator.allocate(Arc::as_ptr(&record) as usize).map_err(|e| {
            log_limit!(DEFAULT_LOG_LIMIT, warn, "no trampoline for {:?}: {}", hwnd, e);
            e
        })?;
        record.thunk_entry.store(thunk.entry(), Ordering::Release);

        if !self.system.set_window_proc(hwnd, thunk.entry()) {
            log_limit!(DEFAULT_LOG_LIMIT, warn, "could not replace window procedure of {:?}", hwnd);
            return Err(HookError::SetWindowProc(hwnd));
        }

        tracing::info!("Hooked {:?} (original {:#x}, trampoline {:#x})", hwnd, original, thunk.entry());
        hooks.live.push(HookSlot {
            record: record.clone(),
            thunk,
        });
        Ok(record)
    }

    /// Unhook `hwnd`, restoring its original procedure; false if not hooked
    pub fn uninstall(&self, hwnd: Hwnd) -> bool {
        let mut hooks = self.hooks();
        let (removed, kept): (Vec<_>, Vec<_>) = hooks.live.drain(..).partition(|s| s.record.hwnd == hwnd);
        hooks.live = kept;
        if removed.is_empty() {
            return false;
        }
        for slot in removed.into_iter().rev() {
            self.restore(&slot.record);
            hooks.retired.push(slot);
        }
        true
    }

    /// Put the original procedure back; false when the window kept the
    /// trampoline
    fn restore(&self, record: &HookRecord) -> bool {
        record.exiting.store(true, Ordering::Release);
        record.deactivate();
        if !self.system.is_window(record.hwnd) || record.original == 0 {
            return true;
        }
        tracing::debug!("Restoring window procedure of {:?}", record.hwnd);
        if self.system.set_window_proc(record.hwnd, record.original) {
            true
        } else {
            log_limit!(DEFAULT_LOG_LIMIT, warn, "could not restore window procedure of {:?}", record.hwnd);
            false
        }
    }

    /// A trampoline may be freed once nothing can enter or return into it
    fn is_releasable(&self, record: &HookRecord) -> bool {
        !record.is_active() && record.in_flight() == 0 && !self.system.is_window(record.hwnd)
    }

    /// Drop inactive records of destroyed windows; returns how many went
    pub fn sweep(&self) -> usize {
        let mut hooks = self.hooks();
        self.sweep_locked(&mut hooks)
    }

    fn sweep_locked(&self, hooks: &mut Hooks<A::Thunk>) -> usize {
        let (stale, live): (Vec<_>, Vec<_>) = hooks
            .live
            .drain(..)
            .partition(|s| !s.record.is_active() && !self.system.is_window(s.record.hwnd));
        hooks.live = live;
        let swept = stale.len();
        hooks.retired.extend(stale);

        let retired = hooks.retired.len();
        hooks.retired.retain(|s| !self.is_releasable(&s.record));
        let freed = retired - hooks.retired.len();
        if swept > 0 || freed > 0 {
            tracing::debug!("Swept {} closed window hook(s), freed {} trampoline(s)", swept, freed);
        }
        swept
    }

    /// Unhook every window
    ///
    /// During process exit the trampolines are leaked: the loader may still
    /// deliver messages through them after this module is gone. On a plain
    /// unload no sweep follows, so every trampoline whose window got its
    /// original procedure back and that no dispatch is running through is
    /// freed here.
    pub fn remove_all(&self, process_exit: bool) -> usize {
        let mut hooks = self.hooks();
        let drained: Vec<_> = hooks.live.drain(..).collect();
        let count = drained.len();
        let mut restored = Vec::new();
        for slot in drained.into_iter().rev() {
            if self.restore(&slot.record) {
                restored.push(slot);
            } else {
                hooks.retired.push(slot);
            }
        }

        if process_exit {
            for slot in hooks.retired.drain(..).chain(restored) {
                std::mem::forget(slot);
            }
            return count;
        }

        let (idle, busy): (Vec<_>, Vec<_>) = restored.into_iter().partition(|s| s.record.in_flight() == 0);
        hooks.retired.extend(busy);
        hooks.retired.retain(|s| !self.is_releasable(&s.record));
        tracing::debug!(
            "Freed {} trampoline(s), {} still retired",
            idle.len(),
            hooks.retired.len()
        );
        drop(idle);
        count
    }

    /// Trampoline that must stay in front when something replaces the
    /// procedure of `hwnd` with `new_proc`
    ///
    /// A hook being torn down that is putting back its own original gets
    /// `None` so the restore goes through.
    pub fn check_wnd_proc(&self, hwnd: Hwnd, new_proc: usize) -> Option<usize> {
        self.hooks()
            .live
            .iter()
            .find(|s| {
                let r = &s.record;
                r.hwnd == hwnd && !(r.is_exiting() && r.original == new_proc)
            })
            .map(|s| s.record.thunk_entry())
    }

    /// Active record for `hwnd`
    pub fn record(&self, hwnd: Hwnd) -> Option<Arc<HookRecord>> {
        self.hooks()
            .live
            .iter()
            .find(|s| s.record.hwnd == hwnd && s.record.is_active())
            .map(|s| s.record.clone())
    }

    pub fn window_state(&self, hwnd: Hwnd) -> Option<WindowState> {
        self.record(hwnd).map(|r| r.state())
    }

    pub fn is_hooked(&self, hwnd: Hwnd) -> bool {
        self.record(hwnd).is_some()
    }

    /// Records held, active or not
    pub fn len(&self) -> usize {
        self.hooks().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removed hooks waiting for the next sweep
    pub fn retired_len(&self) -> usize {
        self.hooks().retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::*;
    use std::collections::HashMap;

    #[derive(Clone)]
    struct FakeWindow {
        proc_addr: usize,
        unicode: bool,
        iconic: bool,
    }

    type Callback = Box<dyn FnOnce() + Send>;

    #[derive(Default)]
    struct FakeWindows {
        windows: Mutex<HashMap<Hwnd, FakeWindow>>,
        calls: Mutex<Vec<(usize, u32, bool)>>,
        refuse_set: AtomicBool,
        /// Runs inside the next application window procedure call
        inside_proc: Mutex<Option<Callback>>,
    }

    impl FakeWindows {
        fn add(&self, hwnd: usize, proc_addr: usize, unicode: bool) -> Hwnd {
            let hwnd = Hwnd(hwnd);
            self.windows.lock().unwrap().insert(
                hwnd,
                FakeWindow {
                    proc_addr,
                    unicode,
                    iconic: false,
                },
            );
            hwnd
        }

        fn destroy(&self, hwnd: Hwnd) {
            self.windows.lock().unwrap().remove(&hwnd);
        }

        fn set_iconic(&self, hwnd: Hwnd, iconic: bool) {
            if let Some(w) = self.windows.lock().unwrap().get_mut(&hwnd) {
                w.iconic = iconic;
            }
        }

        fn proc_of(&self, hwnd: Hwnd) -> usize {
            self.windows.lock().unwrap()[&hwnd].proc_addr
        }

        fn calls(&self) -> Vec<(usize, u32, bool)> {
            self.calls.lock().unwrap().clone()
        }

        fn window(&self, hwnd: Hwnd) -> Option<FakeWindow> {
            self.windows.lock().unwrap().get(&hwnd).cloned()
        }
    }

    impl WindowSystem for FakeWindows {
        fn is_window(&self, hwnd: Hwnd) -> bool {
            self.window(hwnd).is_some()
        }

        fn is_unicode(&self, hwnd: Hwnd) -> bool {
            self.window(hwnd).is_some_and(|w| w.unicode)
        }

        fn is_iconic(&self, hwnd: Hwnd) -> bool {
            self.window(hwnd).is_some_and(|w| w.iconic)
        }

        fn window_proc(&self, hwnd: Hwnd) -> Option<usize> {
            self.window(hwnd).map(|w| w.proc_addr)
        }

        fn set_window_proc(&self, hwnd: Hwnd, proc_addr: usize) -> bool {
            if self.refuse_set.load(Ordering::SeqCst) {
                return false;
            }
            match self.windows.lock().unwrap().get_mut(&hwnd) {
                Some(w) => {
                    w.proc_addr = proc_addr;
                    true
                }
                None => false,
            }
        }

        fn call_window_proc(
            &self,
            proc_addr: usize,
            _hwnd: Hwnd,
            msg: u32,
            _wparam: usize,
            _lparam: isize,
            unicode: bool,
        ) -> isize {
            self.calls.lock().unwrap().push((proc_addr, msg, unicode));
            let callback = self.inside_proc.lock().unwrap().take();
            if let Some(callback) = callback {
                callback();
            }
            0x1234
        }

        fn def_window_proc(&self, _hwnd: Hwnd, msg: u32, _wparam: usize, _lparam: isize, unicode: bool) -> isize {
            self.calls.lock().unwrap().push((0, msg, unicode));
            -1
        }
    }

    struct FakeThunk {
        entry: usize,
        live: Arc<AtomicUsize>,
    }

    impl Thunk for FakeThunk {
        fn entry(&self) -> usize {
            self.entry
        }
    }

    impl Drop for FakeThunk {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeThunks {
        next: AtomicUsize,
        live: Arc<AtomicUsize>,
        fail: AtomicBool,
    }

    impl ThunkAllocator for FakeThunks {
        type Thunk = FakeThunk;

        fn allocate(&self, context: usize) -> Result<FakeThunk> {
            assert_ne!(context, 0);
            if self.fail.load(Ordering::SeqCst) {
                return Err(HookError::ThunkAlloc("out of pages".to_string()));
            }
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(FakeThunk {
                entry: 0x7000_0000 + n * 0x40,
                live: self.live.clone(),
            })
        }
    }

    type Registry = WndProcRegistry<FakeWindows, FakeThunks>;

    const APP_PROC: usize = 0x0040_1000;

    fn registry() -> Registry {
        WndProcRegistry::new(FakeWindows::default(), FakeThunks::default())
    }

    fn live_thunks(reg: &Registry) -> usize {
        reg.allocator.live.load(Ordering::SeqCst)
    }

    #[test]
    fn test_install_uninstall_restores_exact_handler() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);

        let record = reg.install(hwnd, false).unwrap();
        assert_eq!(record.original(), APP_PROC);
        assert_eq!(reg.system().proc_of(hwnd), record.thunk_entry());
        assert_ne!(record.thunk_entry(), APP_PROC);

        assert!(reg.uninstall(hwnd));
        assert_eq!(reg.system().proc_of(hwnd), APP_PROC);
        assert!(!reg.is_hooked(hwnd));
        assert!(record.is_exiting());
        assert!(!reg.uninstall(hwnd));
    }

    #[test]
    fn test_double_install_yields_one_record() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let a = reg.install(hwnd, true).unwrap();
        let b = reg.install(hwnd, true).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert_eq!(live_thunks(&reg), 1);
        assert_eq!(b.original(), APP_PROC);
    }

    #[test]
    fn test_invalid_window_changes_nothing() {
        let reg = registry();
        assert!(matches!(reg.install(Hwnd(0x999), false), Err(HookError::InvalidWindow(_))));
        assert!(matches!(reg.install(Hwnd(0), false), Err(HookError::InvalidWindow(_))));
        assert!(reg.is_empty());
        assert_eq!(live_thunks(&reg), 0);
    }

    #[test]
    fn test_unreadable_handler_fails() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, 0, false);
        assert!(matches!(reg.install(hwnd, false), Err(HookError::NoWindowProc(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_thunk_failure_leaves_window_alone() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, false);
        reg.allocator.fail.store(true, Ordering::SeqCst);
        assert!(matches!(reg.install(hwnd, false), Err(HookError::ThunkAlloc(_))));
        assert_eq!(reg.system().proc_of(hwnd), APP_PROC);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_set_failure_releases_thunk() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, false);
        reg.system().refuse_set.store(true, Ordering::SeqCst);
        assert!(matches!(reg.install(hwnd, false), Err(HookError::SetWindowProc(_))));
        assert_eq!(live_thunks(&reg), 0);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_dispatch_forwards_with_window_mode() {
        let reg = registry();
        let wide = reg.system().add(0x100, APP_PROC, true);
        let narrow = reg.system().add(0x200, APP_PROC + 0x10, false);
        let wide_rec = reg.install(wide, false).unwrap();
        let narrow_rec = reg.install(narrow, false).unwrap();

        assert_eq!(wide_rec.dispatch(reg.system(), wide, 0x0200, 0, 0), 0x1234);
        assert_eq!(narrow_rec.dispatch(reg.system(), narrow, 0x0201, 0, 0), 0x1234);
        assert_eq!(
            reg.system().calls(),
            vec![(APP_PROC, 0x0200, true), (APP_PROC + 0x10, 0x0201, false)]
        );
    }

    #[test]
    fn test_dispatch_without_original_uses_default_handling() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, false);
        let record = HookRecord::new(hwnd, 0, false);
        assert_eq!(record.dispatch(reg.system(), hwnd, 0x000F, 0, 0), -1);
        assert_eq!(reg.system().calls(), vec![(0, 0x000F, false)]);
    }

    #[test]
    fn test_dispatch_null_handle_is_neutral() {
        let reg = registry();
        let record = HookRecord::new(Hwnd(0x100), APP_PROC, true);
        assert_eq!(record.dispatch(reg.system(), Hwnd(0), WM_CLOSE, 0, 0), 0);
        assert!(reg.system().calls().is_empty());
        assert!(record.is_active());
    }

    #[test]
    fn test_closing_transition_happens_once() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, false).unwrap();

        assert!(record.deactivate());
        assert!(!record.deactivate());

        let hwnd2 = reg.system().add(0x200, APP_PROC, true);
        let record2 = reg.install(hwnd2, false).unwrap();
        record2.dispatch(reg.system(), hwnd2, WM_CLOSE, 0, 0);
        assert!(!record2.is_active());
        record2.dispatch(reg.system(), hwnd2, WM_DESTROY, 0, 0);
        record2.dispatch(reg.system(), hwnd2, WM_NCDESTROY, 0, 0);
        assert!(!record2.is_active());
        // Every message still reached the application.
        assert_eq!(reg.system().calls().len(), 3);
    }

    #[test]
    fn test_child_close_does_not_deactivate() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, false).unwrap();
        record.dispatch(reg.system(), Hwnd(0x555), WM_DESTROY, 0, 0);
        assert!(record.is_active());
    }

    #[test]
    fn test_syscommand_close_only() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, false).unwrap();
        record.dispatch(reg.system(), hwnd, WM_SYSCOMMAND, 0xF020, 0);
        assert!(record.is_active());
        record.dispatch(reg.system(), hwnd, WM_SYSCOMMAND, SC_CLOSE, 0);
        assert!(!record.is_active());
        assert!(reg.record(hwnd).is_none());
    }

    #[test]
    fn test_activation_tracking_for_primary_surface() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, true).unwrap();

        record.dispatch(reg.system(), hwnd, WM_ACTIVATE, WA_INACTIVE, 0);
        assert!(record.state().disabled);
        record.dispatch(reg.system(), hwnd, WM_ACTIVATE, 2, 0); // WA_CLICKACTIVE
        assert!(record.state().disabled);
        record.dispatch(reg.system(), hwnd, WM_ACTIVATE, WA_ACTIVE, 0);
        assert!(!record.state().disabled);
    }

    #[test]
    fn test_plain_window_state_untracked() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, false).unwrap();
        reg.system().set_iconic(hwnd, true);
        record.dispatch(reg.system(), hwnd, WM_ACTIVATE, WA_INACTIVE, 0);
        assert_eq!(record.state(), WindowState::default());
    }

    #[test]
    fn test_minimized_tracking() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, true).unwrap();

        reg.system().set_iconic(hwnd, true);
        record.dispatch(reg.system(), hwnd, 0x0005, 0, 0);
        assert!(reg.window_state(hwnd).unwrap().minimized);

        reg.system().set_iconic(hwnd, false);
        record.dispatch(reg.system(), hwnd, 0x0005, 0, 0);
        assert!(!reg.window_state(hwnd).unwrap().minimized);
    }

    #[test]
    fn test_sweep_removes_exactly_stale_records() {
        let reg = registry();
        let closed_gone = reg.system().add(0x100, APP_PROC, true);
        let closed_alive = reg.system().add(0x200, APP_PROC, true);
        let open_gone = reg.system().add(0x300, APP_PROC, true);
        for hwnd in [closed_gone, closed_alive, open_gone] {
            reg.install(hwnd, false).unwrap();
        }
        for hwnd in [closed_gone, closed_alive] {
            reg.record(hwnd).unwrap().dispatch(reg.system(), hwnd, WM_CLOSE, 0, 0);
        }
        reg.system().destroy(closed_gone);
        reg.system().destroy(open_gone);

        let fresh = reg.system().add(0x400, APP_PROC, true);
        reg.install(fresh, false).unwrap();

        assert_eq!(reg.len(), 3);
        assert_eq!(live_thunks(&reg), 3);
        assert_eq!(reg.sweep(), 0);

        let mut survivors: Vec<Hwnd> = [closed_gone, closed_alive, open_gone, fresh]
            .into_iter()
            .filter(|hwnd| reg.hooks().live.iter().any(|s| s.record.hwnd() == *hwnd))
            .collect();
        survivors.sort();
        assert_eq!(survivors, vec![closed_alive, open_gone, fresh]);
        assert!(reg.record(closed_alive).is_none());
        assert!(reg.record(open_gone).is_some());
        assert!(reg.record(fresh).is_some());
    }

    #[test]
    fn test_reinstall_after_close_of_live_window() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let first = reg.install(hwnd, false).unwrap();
        first.dispatch(reg.system(), hwnd, WM_CLOSE, 0, 0);

        let second = reg.install(hwnd, false).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.original(), first.thunk_entry());

        assert!(reg.uninstall(hwnd));
        assert_eq!(reg.system().proc_of(hwnd), APP_PROC);
    }

    #[test]
    fn test_retired_thunks_freed_once_window_is_gone() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        reg.install(hwnd, false).unwrap();
        reg.uninstall(hwnd);
        assert_eq!(reg.retired_len(), 1);
        assert_eq!(live_thunks(&reg), 1);

        // The window still exists and may hold the trampoline in a chain.
        reg.sweep();
        assert_eq!(reg.retired_len(), 1);
        assert_eq!(live_thunks(&reg), 1);

        reg.system().destroy(hwnd);
        reg.sweep();
        assert_eq!(reg.retired_len(), 0);
        assert_eq!(live_thunks(&reg), 0);
    }

    #[test]
    fn test_retired_thunk_survives_while_dispatching() {
        let reg: &'static Registry = Box::leak(Box::new(registry()));
        let a = reg.system().add(0x100, APP_PROC, true);
        let b = reg.system().add(0x200, APP_PROC + 0x10, true);
        let record_a = reg.install(a, false).unwrap();

        let seen_inside = Arc::new(AtomicUsize::new(0));
        let seen = seen_inside.clone();
        *reg.system().inside_proc.lock().unwrap() = Some(Box::new(move || {
            assert!(reg.uninstall(a));
            reg.system().destroy(a);
            reg.install(b, false).unwrap();
            seen.store(live_thunks(reg), Ordering::SeqCst);
        }));

        let result = unsafe { dispatch_raw(reg.system(), Arc::as_ptr(&record_a), a, 0x0200, 0, 0) };
        assert_eq!(result, 0x1234);
        // a's trampoline was still executing while b was installed.
        assert_eq!(seen_inside.load(Ordering::SeqCst), 2);
        assert_eq!(record_a.in_flight(), 0);
        assert_eq!(reg.retired_len(), 1);

        reg.sweep();
        assert_eq!(reg.retired_len(), 0);
        assert_eq!(live_thunks(reg), 1);
    }

    #[test]
    fn test_dispatch_leaves_nothing_in_flight() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, false).unwrap();
        assert_eq!(record.in_flight(), 0);
        record.dispatch(reg.system(), hwnd, 0x0200, 0, 0);
        assert_eq!(record.in_flight(), 0);
    }

    #[test]
    fn test_uninstall_of_destroyed_window() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        reg.install(hwnd, false).unwrap();
        reg.system().destroy(hwnd);
        assert!(reg.uninstall(hwnd));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_all_on_process_exit_leaks_thunks() {
        let reg = registry();
        let a = reg.system().add(0x100, APP_PROC, true);
        let b = reg.system().add(0x200, APP_PROC + 0x10, false);
        reg.install(a, true).unwrap();
        reg.install(b, false).unwrap();

        assert_eq!(reg.remove_all(true), 2);
        assert_eq!(reg.system().proc_of(a), APP_PROC);
        assert_eq!(reg.system().proc_of(b), APP_PROC + 0x10);
        assert_eq!(reg.retired_len(), 0);
        assert_eq!(live_thunks(&reg), 2);
    }

    #[test]
    fn test_remove_all_at_unload_frees_restored_thunks() {
        let reg = registry();
        let a = reg.system().add(0x100, APP_PROC, true);
        let b = reg.system().add(0x200, APP_PROC + 0x10, true);
        reg.install(a, true).unwrap();
        reg.install(b, false).unwrap();
        reg.uninstall(b);
        assert_eq!(live_thunks(&reg), 2);

        assert_eq!(reg.remove_all(false), 1);
        assert_eq!(reg.system().proc_of(a), APP_PROC);
        assert_eq!(live_thunks(&reg), 1);
        // b was retired earlier and its window is still alive.
        assert_eq!(reg.retired_len(), 1);
    }

    #[test]
    fn test_remove_all_at_unload_keeps_unrestored_thunk() {
        let reg = registry();
        let a = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(a, true).unwrap();
        reg.system().refuse_set.store(true, Ordering::SeqCst);

        assert_eq!(reg.remove_all(false), 1);
        assert_eq!(reg.system().proc_of(a), record.thunk_entry());
        assert_eq!(reg.retired_len(), 1);
        assert_eq!(live_thunks(&reg), 1);
    }

    #[test]
    fn test_check_wnd_proc() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, false).unwrap();

        assert_eq!(reg.check_wnd_proc(hwnd, 0x0050_0000), Some(record.thunk_entry()));
        assert_eq!(reg.check_wnd_proc(Hwnd(0x200), 0x0050_0000), None);

        record.exiting.store(true, Ordering::SeqCst);
        assert_eq!(reg.check_wnd_proc(hwnd, APP_PROC), None);
        assert_eq!(reg.check_wnd_proc(hwnd, 0x0050_0000), Some(record.thunk_entry()));
    }

    #[test]
    fn test_dispatch_raw_keeps_record_alive() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let record = reg.install(hwnd, false).unwrap();
        let before = Arc::strong_count(&record);

        let result = unsafe { dispatch_raw(reg.system(), Arc::as_ptr(&record), hwnd, 0x0200, 0, 0) };
        assert_eq!(result, 0x1234);
        assert_eq!(Arc::strong_count(&record), before);

        assert_eq!(
            unsafe { dispatch_raw(reg.system(), std::ptr::null(), hwnd, 0x0200, 0, 0) },
            0
        );
    }

    #[test]
    fn test_concurrent_install_hooks_once() {
        let reg = registry();
        let hwnd = reg.system().add(0x100, APP_PROC, true);
        let records: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| reg.install(hwnd, true).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
        assert_eq!(reg.len(), 1);
        assert_eq!(records[0].original(), APP_PROC);
    }
}
