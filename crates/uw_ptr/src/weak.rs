use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use crate::cell::{Flavor, LivenessCell, Local};
use crate::destroy::Destroy;
use crate::error::AccessError;
use crate::owner::UniqueOwner;

// -----------------------------------------------------------------------------
// WeakState

/// What a [`UniqueWeak`] currently observes.
///
/// `Live` turns into `Expired` exactly once, when the owner destroys,
/// resets or releases the object. It never turns back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeakState {
    /// Not bound to any cell.
    Unbound,
    /// Bound to a cell that still holds the object.
    Live,
    /// Bound to a cell that has been cleared.
    Expired,
}

// -----------------------------------------------------------------------------
// UniqueWeak

/// A non-owning observer of a [`UniqueOwner`]'s object.
///
/// An observer is a snapshot: it binds to the liveness cell the owner held
/// when the observer was created, and keeps that cell alive (but not the
/// object). It can only ask whether the object is still there; there is
/// no way to turn an observer back into an owner.
///
/// # Examples
///
/// ```
/// use uw_ptr::local::UniqueOwner;
/// use uw_ptr::WeakState;
///
/// let mut owner = UniqueOwner::new(1);
/// let before = owner.observe();
///
/// owner.replace(Box::new(2));
/// let after = owner.observe();
///
/// assert_eq!(before.state(), WeakState::Expired);
/// assert_eq!(after.state(), WeakState::Live);
/// assert_eq!(unsafe { after.try_ref() }, Some(&2));
/// ```
pub struct UniqueWeak<T: ?Sized, K: Flavor = Local> {
    ptr: Option<NonNull<T>>,
    cell: Option<K::Handle>,
}

// SAFETY: an observer never accesses the object itself, it only hands out
// the pointer. The cell handle decides whether the flavor may cross threads.
unsafe impl<T, K> Send for UniqueWeak<T, K>
where
    T: ?Sized + Send + Sync,
    K: Flavor,
    K::Handle: Send,
{
}

// SAFETY: see `Send`.
unsafe impl<T, K> Sync for UniqueWeak<T, K>
where
    T: ?Sized + Send + Sync,
    K: Flavor,
    K::Handle: Sync,
{
}

impl<T: ?Sized, K: Flavor> UniqueWeak<T, K> {
    /// Create an unbound observer. It is always expired.
    #[inline]
    pub const fn new() -> Self {
        Self {
            ptr: None,
            cell: None,
        }
    }

    #[inline(always)]
    pub(crate) const fn from_parts(ptr: Option<NonNull<T>>, cell: Option<K::Handle>) -> Self {
        Self { ptr, cell }
    }

    /// Return the current [`WeakState`].
    #[inline]
    pub fn state(&self) -> WeakState {
        match &self.cell {
            None => WeakState::Unbound,
            Some(handle) if K::cell(handle).is_live() => WeakState::Live,
            Some(_) => WeakState::Expired,
        }
    }

    /// Return `true` if the object is gone, or if no cell is bound.
    #[inline]
    pub fn expired(&self) -> bool {
        self.state() != WeakState::Live
    }

    /// Return the object's pointer if it is still owned.
    ///
    /// This never extends the object's lifetime. With the [`Local`] flavor
    /// the answer holds until the owner is next touched; with
    /// [`Atomic`](crate::Atomic) another thread may destroy the object
    /// right after this returns.
    #[inline]
    pub fn try_get(&self) -> Option<NonNull<T>> {
        let addr = K::cell(self.cell.as_ref()?).read()?;
        debug_assert!(self.ptr.is_some_and(|ptr| ptr::addr_eq(ptr.as_ptr(), addr.as_ptr())));
        self.ptr
    }

    /// Like [`try_get`](Self::try_get), reporting why nothing is returned.
    #[inline]
    pub fn checked_get(&self) -> Result<NonNull<T>, AccessError> {
        match self.state() {
            WeakState::Unbound => Err(AccessError::Unbound),
            WeakState::Expired => Err(AccessError::Expired),
            WeakState::Live => self.ptr.ok_or(AccessError::Expired),
        }
    }

    /// Borrow the object if it is still owned.
    ///
    /// # Safety
    ///
    /// The owner must neither destroy the object nor access it mutably
    /// while the returned reference is in use.
    #[inline]
    pub unsafe fn try_ref(&self) -> Option<&T> {
        // SAFETY: the object is alive, and stays so as guaranteed by the caller.
        self.try_get().map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Unbind this observer.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Exchange the bound cells of two observers.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Return `true` if both observers are bound to the same cell.
    #[inline]
    pub fn shares_cell<U: ?Sized>(&self, other: &UniqueWeak<U, K>) -> bool {
        match (&self.cell, &other.cell) {
            (Some(a), Some(b)) => K::same_cell(a, b),
            _ => false,
        }
    }

    /// Number of handles to the bound cell, this one included.
    /// Zero when unbound.
    #[inline]
    pub fn handle_count(&self) -> usize {
        self.cell.as_ref().map_or(0, K::handle_count)
    }

    /// Convert into an observer of another view of the same object,
    /// bound to the same cell.
    ///
    /// # Safety
    ///
    /// `f` must return a pointer to the same object, at the same address.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::fmt::Debug;
    /// use core::ptr::NonNull;
    /// use uw_ptr::local::UniqueOwner;
    ///
    /// let owner = UniqueOwner::new([1u8, 2, 3]);
    /// let weak = unsafe {
    ///     owner.observe().cast(|ptr| -> NonNull<dyn Debug> { ptr })
    /// };
    /// assert!(!weak.expired());
    /// ```
    pub unsafe fn cast<U: ?Sized>(self, f: impl FnOnce(NonNull<T>) -> NonNull<U>) -> UniqueWeak<U, K> {
        let ptr = self.ptr.map(|old| {
            let new = f(old);
            debug_assert!(
                ptr::addr_eq(old.as_ptr(), new.as_ptr()),
                "UniqueWeak::cast moved the object address"
            );
            new
        });
        UniqueWeak {
            ptr,
            cell: self.cell,
        }
    }
}

impl<T: ?Sized, K: Flavor> Clone for UniqueWeak<T, K> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            ptr: self.ptr,
            cell: self.cell.clone(),
        }
    }
}

impl<T: ?Sized, K: Flavor> Default for UniqueWeak<T, K> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, D: Destroy<T>, K: Flavor> From<&UniqueOwner<T, D, K>> for UniqueWeak<T, K> {
    #[inline]
    fn from(owner: &UniqueOwner<T, D, K>) -> Self {
        owner.observe()
    }
}

impl<T: ?Sized, K: Flavor> fmt::Debug for UniqueWeak<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueWeak")
            .field("state", &self.state())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::format;
    use alloc::vec::Vec;
    use core::fmt::Debug;
    use core::hint;
    use core::ptr::NonNull;
    use std::sync::Barrier;
    use std::thread;

    use crate::{AccessError, Local, UniqueWeak, WeakState, local, sync};

    #[test]
    fn is_sync_send() {
        fn is_send<T: Send>() {}
        fn is_sync<T: Sync>() {}

        is_send::<sync::UniqueWeak<u32>>();
        is_sync::<sync::UniqueWeak<u32>>();
        is_send::<sync::UniqueWeak<dyn Debug + Send + Sync>>();
    }

    #[test]
    fn default_is_unbound() {
        let weak: local::UniqueWeak<u32> = UniqueWeak::default();

        assert_eq!(weak.state(), WeakState::Unbound);
        assert!(weak.expired());
        assert!(weak.try_get().is_none());
        assert_eq!(weak.checked_get(), Err(AccessError::Unbound));
        assert_eq!(weak.handle_count(), 0);
        assert!(!weak.shares_cell(&weak.clone()));
    }

    #[test]
    fn clone_and_reset_adjust_count() {
        let owner = local::UniqueOwner::new(4u32);
        let mut first = owner.observe();
        let second = first.clone();
        let third = UniqueWeak::from(&owner);

        assert_eq!(first.handle_count(), 4);
        assert_eq!(owner.observer_count(), 3);
        assert!(first.shares_cell(&second));
        assert_eq!(third.checked_get(), Ok(owner.get().unwrap()));

        first.reset();
        assert_eq!(first.state(), WeakState::Unbound);
        assert_eq!(second.handle_count(), 3);

        drop(second);
        drop(third);
        assert_eq!(owner.observer_count(), 0);
    }

    #[test]
    fn expired_is_final() {
        let mut owner = local::UniqueOwner::new(1u32);
        let weak = owner.observe();
        let copy_before = weak.clone();

        owner.replace(Box::new(2));
        assert_eq!(weak.checked_get(), Err(AccessError::Expired));

        // Copies of an expired observer stay on the old cell.
        let copy_after = weak.clone();
        owner.replace(Box::new(3));
        for observer in [&weak, &copy_before, &copy_after] {
            assert_eq!(observer.state(), WeakState::Expired);
        }
        assert!(!owner.observe().expired());
    }

    #[test]
    fn swap_and_reassign() {
        let a = local::UniqueOwner::new(1u32);
        let b = local::UniqueOwner::new(2u32);
        let mut weak_a = a.observe();
        let mut weak_b = b.observe();

        weak_a.swap(&mut weak_b);
        assert_eq!(unsafe { weak_a.try_ref() }, Some(&2));
        assert_eq!(unsafe { weak_b.try_ref() }, Some(&1));

        weak_b = weak_a.clone();
        assert!(weak_b.shares_cell(&weak_a));

        drop(b);
        assert!(weak_a.expired());
        assert!(weak_b.expired());
        assert!(!a.observe().expired());
    }

    #[test]
    fn cast_shares_cell() {
        let owner = local::UniqueOwner::new([1u8, 2, 3]);
        let weak = owner.observe();
        let erased: UniqueWeak<dyn Debug, Local> =
            unsafe { weak.clone().cast(|ptr| -> NonNull<dyn Debug> { ptr }) };
        let sliced = unsafe { weak.clone().cast(|ptr| -> NonNull<[u8]> { ptr }) };

        assert!(erased.shares_cell(&weak));
        assert_eq!(unsafe { sliced.try_ref() }.map(<[u8]>::len), Some(3));
        assert_eq!(format!("{:?}", unsafe { erased.try_ref() }.unwrap()), "[1, 2, 3]");

        drop(owner);
        assert!(erased.expired());
        assert!(sliced.expired());
    }

    #[test]
    fn debug_shows_state() {
        let owner = local::UniqueOwner::new(0u8);
        let weak = owner.observe();
        assert_eq!(format!("{weak:?}"), "UniqueWeak { state: Live }");
        drop(owner);
        assert_eq!(format!("{weak:?}"), "UniqueWeak { state: Expired }");
    }

    #[test]
    fn observer_on_other_thread_sees_drop() {
        let owner = sync::UniqueOwner::new(5u64);
        let weak = owner.observe();

        thread::scope(|s| {
            let watcher = s.spawn(move || {
                while weak.try_get().is_some() {
                    hint::spin_loop();
                }
                weak.state()
            });

            drop(owner);
            assert_eq!(watcher.join().unwrap(), WeakState::Expired);
        });
    }

    #[test]
    fn observers_expire_together_across_threads() {
        const WATCHERS: usize = 4;

        let mut owner = sync::UniqueOwner::new(Vec::from([1u32, 2, 3]));
        let barrier = Barrier::new(WATCHERS + 1);

        thread::scope(|s| {
            let watchers: Vec<_> = (0..WATCHERS)
                .map(|_| {
                    let weak = owner.observe();
                    let barrier = &barrier;
                    s.spawn(move || {
                        assert!(!weak.expired());
                        barrier.wait();
                        while !weak.expired() {
                            hint::spin_loop();
                        }
                        weak.checked_get().err()
                    })
                })
                .collect();

            barrier.wait();
            let released = owner.release_box();
            assert_eq!(released.as_deref().map(Vec::len), Some(3));

            for watcher in watchers {
                assert_eq!(watcher.join().unwrap(), Some(AccessError::Expired));
            }
        });
    }

    #[test]
    fn owner_dropped_on_other_thread() {
        let owner = sync::UniqueOwner::new(Box::<str>::from("moved"));
        let weak = owner.observe();

        thread::spawn(move || {
            assert_eq!(&**owner, "moved");
        })
        .join()
        .unwrap();

        assert!(weak.expired());
        assert_eq!(weak.handle_count(), 1);
    }
}
