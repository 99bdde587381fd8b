//! Liveness cells and the flavors that share them.
//!
//! A liveness cell is a heap-allocated slot holding the address of an owned
//! object, or nothing. The owner writes it once on creation and clears it
//! once when the object goes away; observers only read it.
//!
//! The slot stores a thin `NonNull<u8>` address. Pointer metadata (slice
//! length, vtable) is carried by the typed handles instead, so owners and
//! observers of different unsized views of one object share the same cell.

use alloc::rc::Rc;
use core::cell::Cell;
use core::fmt;
use core::ptr::{self, NonNull};

use uw_os::sync::Arc;
use uw_os::sync::atomic::{AtomicPtr, Ordering};

// -----------------------------------------------------------------------------
// LivenessCell

/// The slot shared between an owner and its observers.
///
/// A cell is only ever written by the owner that allocated it:
/// once by [`new`](LivenessCell::new), once by [`clear`](LivenessCell::clear).
/// Once cleared, a cell never becomes live again.
pub trait LivenessCell {
    /// Create a cell storing `addr`.
    fn new(addr: Option<NonNull<u8>>) -> Self;

    /// Empty the slot. Further calls are no-ops.
    fn clear(&self);

    /// Read the current slot value.
    fn read(&self) -> Option<NonNull<u8>>;

    /// Return `true` if the slot currently holds an address.
    #[inline]
    fn is_live(&self) -> bool {
        self.read().is_some()
    }
}

/// A liveness cell for single-thread use.
///
/// Shared through [`Rc`], so neither the cell nor its handles can leave
/// the thread that created them.
pub struct LocalCell {
    slot: Cell<Option<NonNull<u8>>>,
}

impl LivenessCell for LocalCell {
    #[inline]
    fn new(addr: Option<NonNull<u8>>) -> Self {
        Self {
            slot: Cell::new(addr),
        }
    }

    #[inline]
    fn clear(&self) {
        self.slot.set(None);
    }

    #[inline]
    fn read(&self) -> Option<NonNull<u8>> {
        self.slot.get()
    }
}

impl fmt::Debug for LocalCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCell")
            .field("slot", &self.read())
            .finish()
    }
}

/// A liveness cell that may be observed from other threads.
///
/// [`clear`](LivenessCell::clear) stores with [`Ordering::Release`] and
/// [`read`](LivenessCell::read) loads with [`Ordering::Acquire`]. An observer
/// that reads an empty slot therefore also sees every write the owner made
/// while destroying the object.
pub struct AtomicCell {
    slot: AtomicPtr<u8>,
}

impl LivenessCell for AtomicCell {
    #[inline]
    fn new(addr: Option<NonNull<u8>>) -> Self {
        let raw = match addr {
            Some(addr) => addr.as_ptr(),
            None => ptr::null_mut(),
        };
        Self {
            slot: AtomicPtr::new(raw),
        }
    }

    #[inline]
    fn clear(&self) {
        self.slot.store(ptr::null_mut(), Ordering::Release);
    }

    #[inline]
    fn read(&self) -> Option<NonNull<u8>> {
        NonNull::new(self.slot.load(Ordering::Acquire))
    }
}

impl fmt::Debug for AtomicCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicCell")
            .field("slot", &self.read())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Flavor

mod sealed {
    pub trait Sealed {}
}

/// Selects how a liveness cell is stored and shared.
///
/// - [`Local`]: [`LocalCell`] behind an [`Rc`], non-atomic counting.
/// - [`Atomic`]: [`AtomicCell`] behind an [`Arc`], usable across threads.
///
/// This trait is sealed.
pub trait Flavor: sealed::Sealed + 'static {
    /// The cell type.
    type Cell: LivenessCell;

    /// A counted handle to a cell.
    type Handle: Clone;

    /// Allocate a new cell storing `addr` and return the first handle to it.
    fn alloc(addr: Option<NonNull<u8>>) -> Self::Handle;

    /// Access the cell behind a handle.
    fn cell(handle: &Self::Handle) -> &Self::Cell;

    /// Number of live handles to the cell, including `handle`.
    fn handle_count(handle: &Self::Handle) -> usize;

    /// Return `true` if both handles refer to the same cell.
    fn same_cell(a: &Self::Handle, b: &Self::Handle) -> bool;
}

/// Single-thread flavor, see [`Flavor`].
#[derive(Debug, Clone, Copy)]
pub enum Local {}

/// Thread-safe flavor, see [`Flavor`].
#[derive(Debug, Clone, Copy)]
pub enum Atomic {}

impl sealed::Sealed for Local {}
impl sealed::Sealed for Atomic {}

impl Flavor for Local {
    type Cell = LocalCell;
    type Handle = Rc<LocalCell>;

    #[inline]
    fn alloc(addr: Option<NonNull<u8>>) -> Self::Handle {
        Rc::new(LocalCell::new(addr))
    }

    #[inline(always)]
    fn cell(handle: &Self::Handle) -> &Self::Cell {
        handle
    }

    #[inline]
    fn handle_count(handle: &Self::Handle) -> usize {
        Rc::strong_count(handle)
    }

    #[inline]
    fn same_cell(a: &Self::Handle, b: &Self::Handle) -> bool {
        Rc::ptr_eq(a, b)
    }
}

impl Flavor for Atomic {
    type Cell = AtomicCell;
    type Handle = Arc<AtomicCell>;

    #[inline]
    fn alloc(addr: Option<NonNull<u8>>) -> Self::Handle {
        Arc::new(AtomicCell::new(addr))
    }

    #[inline(always)]
    fn cell(handle: &Self::Handle) -> &Self::Cell {
        handle
    }

    #[inline]
    fn handle_count(handle: &Self::Handle) -> usize {
        Arc::strong_count(handle)
    }

    #[inline]
    fn same_cell(a: &Self::Handle, b: &Self::Handle) -> bool {
        Arc::ptr_eq(a, b)
    }
}

// -----------------------------------------------------------------------------
// ClearGuard

/// Clears a cell when dropped.
///
/// Owners hold one of these while running a destroy policy, so the cell is
/// cleared even if the policy panics.
pub(crate) struct ClearGuard<K: Flavor>(pub(crate) Option<K::Handle>);

impl<K: Flavor> Drop for ClearGuard<K> {
    #[inline]
    fn drop(&mut self) {
        if let Some(handle) = &self.0 {
            K::cell(handle).clear();
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn addr_of(x: &mut u64) -> NonNull<u8> {
        NonNull::from(x).cast()
    }

    fn clear_is_idempotent<C: LivenessCell>() {
        let mut x = 1u64;
        let cell = C::new(Some(addr_of(&mut x)));
        assert!(cell.is_live());
        assert_eq!(cell.read(), Some(addr_of(&mut x)));

        cell.clear();
        assert!(!cell.is_live());
        cell.clear();
        assert_eq!(cell.read(), None);
    }

    #[test]
    fn local_clear() {
        clear_is_idempotent::<LocalCell>();
    }

    #[test]
    fn atomic_clear() {
        clear_is_idempotent::<AtomicCell>();
    }

    #[test]
    fn empty_cell_is_never_live() {
        assert!(!LocalCell::new(None).is_live());
        assert!(!AtomicCell::new(None).is_live());
    }

    fn handles_count<K: Flavor>() {
        let mut x = 1u64;
        let a = K::alloc(Some(addr_of(&mut x)));
        let b = a.clone();
        let c = K::alloc(None);

        assert_eq!(K::handle_count(&a), 2);
        assert!(K::same_cell(&a, &b));
        assert!(!K::same_cell(&a, &c));

        K::cell(&b).clear();
        assert!(!K::cell(&a).is_live());

        drop(b);
        assert_eq!(K::handle_count(&a), 1);
    }

    #[test]
    fn local_handles() {
        handles_count::<Local>();
    }

    #[test]
    fn atomic_handles() {
        handles_count::<Atomic>();
    }

    #[test]
    fn guard_clears_on_drop() {
        let mut x = 1u64;
        let handle = Local::alloc(Some(addr_of(&mut x)));
        {
            let _guard = ClearGuard::<Local>(Some(handle.clone()));
            assert!(handle.is_live());
        }
        assert!(!handle.is_live());

        // An empty guard is a no-op.
        drop(ClearGuard::<Atomic>(None));
    }
}
