//! Wrapper identity table
//!
//! Maps a real interface address to the wrapper standing in for it, so that
//! handing the same real object out twice always yields the same wrapper.
//!
//! Every operation runs under one mutex. Factories passed to
//! [`IdentityTable::find_or_create`] run while that mutex is held and must
//! only construct their object; a factory that calls back into the table on
//! the same thread gets [`IdentityError::Reentrant`] instead of a deadlock.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::interface::InterfaceId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("real object address must not be null")]
    NullPointer,

    #[error("identity table re-entered from inside a factory or callback")]
    Reentrant,

    #[error("wrapper recorded for {addr:?} as {recorded:?} is not of the requested type")]
    TypeMismatch {
        addr: RealAddr,
        recorded: InterfaceId,
    },
}

pub type Result<T> = std::result::Result<T, IdentityError>;

// ============================================================================
// Keys and wrappers
// ============================================================================

/// Address of a real (proxied) object, used purely as an opaque key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RealAddr(pub usize);

impl RealAddr {
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Synthetic keys handed to placeholder wrappers are always odd
    pub const fn is_placeholder(&self) -> bool {
        self.0 & 1 == 1
    }

    pub fn as_ptr<T>(&self) -> *mut T {
        self.0 as *mut T
    }
}

impl fmt::Debug for RealAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// An object recorded in the identity table
pub trait Wrapper: Send + Sync + 'static {
    /// Interface id the wrapper was created for
    fn interface(&self) -> InterfaceId;

    /// Whether this wrapper can satisfy a request for `requested`
    fn is_compatible(&self, requested: &InterfaceId) -> bool {
        *requested == self.interface()
    }

    /// Real object behind the wrapper, `None` for placeholders
    fn real_address(&self) -> Option<RealAddr>;
}

/// One recorded (real address, wrapper) binding
#[derive(Clone)]
pub struct WrapperEntry {
    interface: InterfaceId,
    wrapper: Arc<dyn Wrapper>,
    any: Arc<dyn Any + Send + Sync>,
}

impl WrapperEntry {
    fn new<W: Wrapper>(wrapper: Arc<W>) -> Self {
        Self {
            interface: wrapper.interface(),
            wrapper: wrapper.clone(),
            any: wrapper,
        }
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub fn wrapper(&self) -> &Arc<dyn Wrapper> {
        &self.wrapper
    }

    fn downcast<W: Wrapper>(&self) -> Option<Arc<W>> {
        self.any.clone().downcast::<W>().ok()
    }

    fn is(&self, wrapper: &Arc<dyn Wrapper>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.wrapper), Arc::as_ptr(wrapper))
    }
}

impl fmt::Debug for WrapperEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperEntry")
            .field("interface", &self.interface)
            .field("wrapper", &Arc::as_ptr(&self.wrapper))
            .finish()
    }
}

// ============================================================================
// Reentrancy detection
// ============================================================================

static NEXT_TABLE_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Ids of identity tables whose lock the current thread holds
    static HELD_TABLES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct TableGuard<'a> {
    table_id: usize,
    entries: MutexGuard<'a, HashMap<RealAddr, Vec<WrapperEntry>>>,
}

impl Drop for TableGuard<'_> {
    fn drop(&mut self) {
        HELD_TABLES.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|id| *id == self.table_id) {
                held.remove(pos);
            }
        });
    }
}

// ============================================================================
// IdentityTable
// ============================================================================

/// Process-wide (or per-context) real address → wrapper map
pub struct IdentityTable {
    id: usize,
    entries: Mutex<HashMap<RealAddr, Vec<WrapperEntry>>>,
    next_placeholder: AtomicUsize,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            entries: Mutex::new(HashMap::new()),
            next_placeholder: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> Result<TableGuard<'_>> {
        let reentrant = HELD_TABLES.with(|held| held.borrow().contains(&self.id));
        if reentrant {
            dxshim_common::log_limit!(
                dxshim_common::DEFAULT_LOG_LIMIT,
                error,
                "identity table re-entered on the same thread"
            );
            return Err(IdentityError::Reentrant);
        }

        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        HELD_TABLES.with(|held| held.borrow_mut().push(self.id));
        Ok(TableGuard {
            table_id: self.id,
            entries,
        })
    }

    /// Return the wrapper recorded for `real` that can serve `kind`, or build
    /// one with `factory` and record it.
    pub fn find_or_create<W, F>(&self, real: RealAddr, kind: InterfaceId, factory: F) -> Result<Arc<W>>
    where
        W: Wrapper,
        F: FnOnce() -> W,
    {
        self.record(real, kind, || Arc::new(factory()))
    }

    /// Record an already constructed wrapper under `real`
    ///
    /// An existing compatible entry wins and is returned instead.
    pub fn insert<W: Wrapper>(&self, real: RealAddr, wrapper: Arc<W>) -> Result<Arc<W>> {
        let kind = wrapper.interface();
        self.record(real, kind, move || wrapper)
    }

    fn record<W, F>(&self, real: RealAddr, kind: InterfaceId, make: F) -> Result<Arc<W>>
    where
        W: Wrapper,
        F: FnOnce() -> Arc<W>,
    {
        if real.is_null() {
            return Err(IdentityError::NullPointer);
        }

        let mut guard = self.lock()?;
        let existing = guard
            .entries
            .get(&real)
            .and_then(|slot| slot.iter().find(|e| e.wrapper.is_compatible(&kind)));
        if let Some(entry) = existing {
            return entry.downcast::<W>().ok_or(IdentityError::TypeMismatch {
                addr: real,
                recorded: entry.interface,
            });
        }

        // The slot only appears once the factory has returned.
        let wrapper = make();
        tracing::debug!("Recording {:?} wrapper for real object {:?}", kind, real);
        guard
            .entries
            .entry(real)
            .or_default()
            .push(WrapperEntry::new(wrapper.clone()));
        Ok(wrapper)
    }

    /// First wrapper recorded for `real`
    pub fn lookup(&self, real: RealAddr) -> Option<Arc<dyn Wrapper>> {
        let guard = self.lock().ok()?;
        guard
            .entries
            .get(&real)
            .and_then(|slot| slot.first())
            .map(|entry| entry.wrapper.clone())
    }

    /// Wrapper recorded for `real` that can serve `kind`, typed
    pub fn lookup_as<W: Wrapper>(&self, real: RealAddr, kind: InterfaceId) -> Option<Arc<W>> {
        let guard = self.lock().ok()?;
        guard
            .entries
            .get(&real)?
            .iter()
            .find(|e| e.wrapper.is_compatible(&kind))
            .and_then(WrapperEntry::downcast::<W>)
    }

    /// Drop every wrapper recorded for `real`; returns how many were removed
    pub fn forget(&self, real: RealAddr) -> usize {
        match self.lock() {
            Ok(mut guard) => guard.entries.remove(&real).map_or(0, |slot| slot.len()),
            Err(_) => 0,
        }
    }

    /// Drop the wrapper recorded for `real` under exactly `interface`
    pub fn forget_entry(&self, real: RealAddr, interface: InterfaceId) -> bool {
        let Ok(mut guard) = self.lock() else {
            return false;
        };
        let Some(slot) = guard.entries.get_mut(&real) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|e| e.interface != interface);
        let removed = slot.len() != before;
        if slot.is_empty() {
            guard.entries.remove(&real);
        }
        removed
    }

    /// Drop `wrapper` wherever it is recorded
    pub fn forget_wrapper(&self, wrapper: &Arc<dyn Wrapper>) -> bool {
        let Ok(mut guard) = self.lock() else {
            return false;
        };
        let mut removed = false;
        guard.entries.retain(|_, slot| {
            let before = slot.len();
            slot.retain(|e| !e.is(wrapper));
            removed |= slot.len() != before;
            !slot.is_empty()
        });
        removed
    }

    /// Key for a wrapper that has no real object yet
    ///
    /// Odd values never alias a real interface pointer, which is always
    /// pointer-aligned.
    pub fn placeholder_key(&self) -> RealAddr {
        let n = self.next_placeholder.fetch_add(1, Ordering::Relaxed);
        RealAddr((n << 1) | 1)
    }

    pub fn contains(&self, real: RealAddr) -> bool {
        self.lock()
            .map(|guard| guard.entries.contains_key(&real))
            .unwrap_or(false)
    }

    /// Number of recorded wrappers
    pub fn len(&self) -> usize {
        self.lock()
            .map(|guard| guard.entries.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry, for diagnostics
    pub fn entries(&self) -> Vec<(RealAddr, WrapperEntry)> {
        self.lock()
            .map(|guard| {
                guard
                    .entries
                    .iter()
                    .flat_map(|(addr, slot)| slot.iter().map(|e| (*addr, e.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every entry (module unload)
    pub fn clear(&self) -> usize {
        match self.lock() {
            Ok(mut guard) => {
                let count = guard.entries.values().map(Vec::len).sum();
                guard.entries.clear();
                count
            }
            Err(_) => 0,
        }
    }
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self::new()
    }
}
