use alloc::boxed::Box;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use crate::cell::{ClearGuard, Flavor, LivenessCell, Local};
use crate::destroy::{DefaultDestroy, Destroy};
use crate::error::{AccessError, CoerceError};
use crate::weak::UniqueWeak;

// -----------------------------------------------------------------------------
// UniqueOwner

/// An exclusive owner whose object can be watched by [`UniqueWeak`] observers.
///
/// Like `Box<T>`, it is the only owner of its object and destroys it when
/// dropped, using the destroy policy `D`. In addition it shares a liveness
/// cell with every observer created through [`observe`](Self::observe).
/// The owner clears that cell whenever it gives up the object, so observers
/// can tell afterwards that the object is gone. Observers never keep the
/// object alive.
///
/// `K` selects the cell [`Flavor`]. The aliases in [`local`](crate::local)
/// and [`sync`](crate::sync) fix it, which is usually what you want:
/// constructors are generic over `K`, so a bare `UniqueOwner::new` call
/// needs a type annotation to pick one.
///
/// # Cells
///
/// - Constructing from an object (or from a null pointer) allocates a cell.
/// - [`empty`](Self::empty) and [`Default`] allocate nothing.
/// - Moving the owner moves its cell along, observers are not affected.
/// - [`reset`](Self::reset) clears the current cell and allocates a fresh one,
///   so observers taken before the reset stay expired.
/// - [`release`](Self::release) clears the cell without destroying the object.
///
/// # Unsized objects
///
/// `T` may be unsized. A `UniqueOwner<[T]>` or `UniqueOwner<dyn Trait>`
/// owns one object, built through [`coerce`](Self::coerce) or
/// [`from_box`](Self::from_box). A slice is a single object here: it is
/// destroyed as a whole and observed through one cell, and indexing goes
/// through `Deref` to `[T]`. There is no per-element ownership.
///
/// # Ownership
///
/// The owner cannot be duplicated:
///
/// ```compile_fail
/// use uw_ptr::local::UniqueOwner;
///
/// let owner = UniqueOwner::new(1u32);
/// let copy = owner.clone();
/// ```
///
/// A [`Local`] owner cannot leave its thread, see [`sync::UniqueOwner`](crate::sync::UniqueOwner):
///
/// ```compile_fail
/// use uw_ptr::local::UniqueOwner;
///
/// let owner = UniqueOwner::new(1u32);
/// std::thread::spawn(move || drop(owner));
/// ```
///
/// # Examples
///
/// ```
/// use uw_ptr::local::UniqueOwner;
///
/// let owner = UniqueOwner::new(String::from("vc"));
/// let weak = owner.observe();
/// assert!(!weak.expired());
///
/// drop(owner);
/// assert!(weak.expired());
/// assert!(weak.try_get().is_none());
/// ```
pub struct UniqueOwner<T: ?Sized, D: Destroy<T> = DefaultDestroy, K: Flavor = Local> {
    ptr: Option<NonNull<T>>,
    destroy: D,
    cell: Option<K::Handle>,
    _marker: PhantomData<T>,
}

// SAFETY: the owner has exclusive access to its object, like `Box<T>`.
// The cell handle decides whether the flavor may cross threads.
unsafe impl<T, D, K> Send for UniqueOwner<T, D, K>
where
    T: ?Sized + Send,
    D: Destroy<T> + Send,
    K: Flavor,
    K::Handle: Send,
{
}

// SAFETY: `&UniqueOwner` only hands out `&T` and `&D`.
unsafe impl<T, D, K> Sync for UniqueOwner<T, D, K>
where
    T: ?Sized + Sync,
    D: Destroy<T> + Sync,
    K: Flavor,
    K::Handle: Sync,
{
}

impl<T, K: Flavor> UniqueOwner<T, DefaultDestroy, K> {
    /// Move `value` to the heap and own it.
    ///
    /// # Examples
    ///
    /// ```
    /// use uw_ptr::sync::UniqueOwner;
    ///
    /// let owner = UniqueOwner::new(5);
    /// assert_eq!(*owner, 5);
    /// ```
    #[inline]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized, K: Flavor> UniqueOwner<T, DefaultDestroy, K> {
    /// Take ownership of a boxed object.
    #[inline]
    pub fn from_box(boxed: Box<T>) -> Self {
        Self::from_parts(Some(NonNull::from(Box::leak(boxed))), DefaultDestroy)
    }

    /// Release the object back into a [`Box`].
    ///
    /// Same as [`release`](Self::release): the cell is cleared and
    /// observers report expired.
    #[inline]
    pub fn release_box(&mut self) -> Option<Box<T>> {
        // SAFETY: with `DefaultDestroy` every owned pointer came from a `Box`.
        self.release().map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }

    /// Destroy the current object and own `boxed` instead.
    ///
    /// See [`reset`](Self::reset) for how observers are affected.
    #[inline]
    pub fn replace(&mut self, boxed: Box<T>) {
        self.reset_with(Some(NonNull::from(Box::leak(boxed))));
    }

    /// Convert into an owner of an unsized view of the object, such as a
    /// trait object or a slice.
    ///
    /// `f` receives the object as a [`Box`] and is expected to return that
    /// same box, coerced (`|b| b` or `|b| b as Box<dyn Trait>`). A box
    /// cannot be projected onto a field of a type with its own `Drop`, so
    /// the object's destructor always runs eventually.
    ///
    /// The liveness cell moves along, so existing observers keep
    /// observing the object. An empty owner keeps its cell and `f` is
    /// not called.
    ///
    /// # Errors
    ///
    /// If `f` returns a box at another address, the object is no longer
    /// the one observers watch: the old cell is cleared and the returned
    /// box is handed back in the error, owned by a fresh owner.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::fmt::Display;
    /// use uw_ptr::local::UniqueOwner;
    ///
    /// let owner = UniqueOwner::new(42u32);
    /// let weak = owner.observe();
    ///
    /// let owner = owner.coerce(|x| x as Box<dyn Display>).unwrap();
    /// assert_eq!(owner.to_string(), "42");
    /// assert!(!weak.expired());
    /// ```
    ///
    /// Fields of a type with its own `Drop` cannot be moved out:
    ///
    /// ```compile_fail
    /// use uw_ptr::local::UniqueOwner;
    ///
    /// struct Inner(u32);
    /// struct Guard {
    ///     inner: Inner,
    /// }
    ///
    /// impl Drop for Guard {
    ///     fn drop(&mut self) {}
    /// }
    ///
    /// let owner = UniqueOwner::new(Guard { inner: Inner(1) });
    /// let _ = owner.coerce(|guard| Box::new(guard.inner));
    /// ```
    pub fn coerce<U: ?Sized>(
        self,
        f: impl FnOnce(Box<T>) -> Box<U>,
    ) -> Result<UniqueOwner<U, DefaultDestroy, K>, CoerceError<UniqueOwner<U, DefaultDestroy, K>>>
    {
        let (ptr, destroy, cell) = self.into_parts();
        let Some(ptr) = ptr else {
            return Ok(UniqueOwner {
                ptr: None,
                destroy,
                cell,
                _marker: PhantomData,
            });
        };

        // Clears the cell if `f` panics, the box is gone by then.
        let mut guard = ClearGuard::<K>(cell);
        // SAFETY: with `DefaultDestroy` every owned pointer came from a `Box`.
        let view = f(unsafe { Box::from_raw(ptr.as_ptr()) });
        let view = NonNull::from(Box::leak(view));

        if !ptr::addr_eq(ptr.as_ptr(), view.as_ptr()) {
            log::warn!(
                "rejected coercion of UniqueOwner<{}> to `{}`: the view points to a different address",
                core::any::type_name::<T>(),
                core::any::type_name::<U>(),
            );
            drop(guard);
            return Err(CoerceError {
                owner: UniqueOwner::from_parts(Some(view), destroy),
            });
        }

        Ok(UniqueOwner {
            ptr: Some(view),
            destroy,
            cell: guard.0.take(),
            _marker: PhantomData,
        })
    }
}

impl<T: ?Sized, D: Destroy<T>, K: Flavor> UniqueOwner<T, D, K> {
    /// Create an owner without object and without cell.
    ///
    /// Observers taken from it are unbound, and they stay unbound even if
    /// the owner later receives an object.
    #[inline]
    pub fn empty() -> Self
    where
        D: Default,
    {
        Self::empty_with(D::default())
    }

    /// Like [`empty`](Self::empty), with an explicit destroy policy.
    #[inline]
    pub fn empty_with(destroy: D) -> Self {
        Self {
            ptr: None,
            destroy,
            cell: None,
            _marker: PhantomData,
        }
    }

    /// Take ownership of a raw pointer, using a default destroy policy.
    ///
    /// A null `ptr` is accepted: the owner holds no object but still
    /// allocates a cell, so its observers are bound and expired.
    ///
    /// # Safety
    ///
    /// `ptr` must be null, or a pointer that `D` can destroy and that
    /// nothing else owns. For [`DefaultDestroy`] this means a pointer
    /// returned by [`Box::into_raw`].
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self
    where
        D: Default,
    {
        Self::from_parts(NonNull::new(ptr), D::default())
    }

    /// Take ownership of a raw pointer with the given destroy policy.
    ///
    /// # Safety
    ///
    /// See [`from_raw`](Self::from_raw).
    #[inline]
    pub unsafe fn from_raw_with(ptr: *mut T, destroy: D) -> Self {
        Self::from_parts(NonNull::new(ptr), destroy)
    }

    fn from_parts(ptr: Option<NonNull<T>>, destroy: D) -> Self {
        if ptr.is_none() {
            log::trace!("allocating an empty liveness cell for a null UniqueOwner");
        }
        Self {
            ptr,
            destroy,
            cell: Some(K::alloc(ptr.map(NonNull::cast::<u8>))),
            _marker: PhantomData,
        }
    }

    /// Take the owner apart without running its destructor.
    fn into_parts(self) -> (Option<NonNull<T>>, D, Option<K::Handle>) {
        let mut this = ManuallyDrop::new(self);
        let ptr = this.ptr.take();
        let cell = this.cell.take();
        // SAFETY: `this` is never used or dropped again.
        let destroy = unsafe { ptr::read(&this.destroy) };
        (ptr, destroy, cell)
    }

    /// Give up ownership of the object without destroying it.
    ///
    /// The cell is cleared and dropped: observers report expired from now
    /// on, although the returned object is still alive. The caller is now
    /// responsible for the object. The owner ends up empty, without cell,
    /// and with a default destroy policy; the previous policy is dropped
    /// without being invoked.
    ///
    /// Use [`into_raw_parts`](Self::into_raw_parts) to keep a policy that
    /// has no default.
    ///
    /// # Examples
    ///
    /// ```
    /// use uw_ptr::local::UniqueOwner;
    ///
    /// let mut owner = UniqueOwner::new(3);
    /// let weak = owner.observe();
    ///
    /// let boxed = owner.release_box().unwrap();
    /// assert!(weak.expired());
    /// assert!(owner.is_empty());
    /// assert_eq!(*boxed, 3);
    /// ```
    pub fn release(&mut self) -> Option<NonNull<T>>
    where
        D: Default,
    {
        let ptr = self.ptr.take();
        self.destroy = D::default();
        Self::expire(ptr.is_some(), self.cell.take());
        ptr
    }

    /// Consume the owner, returning the object and its destroy policy.
    ///
    /// Observers report expired afterwards, as with [`release`](Self::release).
    pub fn into_raw_parts(self) -> (Option<NonNull<T>>, D) {
        let (ptr, destroy, cell) = self.into_parts();
        Self::expire(ptr.is_some(), cell);
        (ptr, destroy)
    }

    fn expire(had_object: bool, cell: Option<K::Handle>) {
        if let Some(handle) = cell {
            let observers = K::handle_count(&handle) - 1;
            if had_object && observers > 0 {
                log::debug!(
                    "released an object watched by {observers} observer(s), they now report expired"
                );
            }
            K::cell(&handle).clear();
        }
    }

    /// Destroy the current object, if any, and become null.
    ///
    /// The old object is destroyed by the old policy, and the owner
    /// continues with a default one. The current cell is cleared and a
    /// new, empty cell is allocated. Observers taken before the call keep
    /// observing the old cell and report expired. Observers taken after
    /// the call observe the new one.
    #[inline]
    pub fn reset(&mut self)
    where
        D: Default,
    {
        self.reset_with(None);
    }

    /// Destroy the current object, if any, and own `ptr` instead.
    ///
    /// See [`reset`](Self::reset) for how observers and the destroy
    /// policy are affected.
    ///
    /// # Safety
    ///
    /// See [`from_raw`](Self::from_raw): `ptr` must be destroyable by a
    /// default `D`. In particular `ptr` must not be the object currently
    /// owned by `self`.
    #[inline]
    pub unsafe fn reset_raw(&mut self, ptr: *mut T)
    where
        D: Default,
    {
        self.reset_with(NonNull::new(ptr));
    }

    fn reset_with(&mut self, ptr: Option<NonNull<T>>)
    where
        D: Default,
    {
        let new_cell = K::alloc(ptr.map(NonNull::cast::<u8>));
        let old_ptr = mem::replace(&mut self.ptr, ptr);
        let mut old_destroy = mem::take(&mut self.destroy);
        let _guard = ClearGuard::<K>(mem::replace(&mut self.cell, Some(new_cell)));
        if let Some(old) = old_ptr {
            // SAFETY: `old` was owned by `self` and has just been detached.
            unsafe { old_destroy.destroy(old) };
        }
    }

    /// Return the owned object's pointer, `None` if empty.
    #[inline(always)]
    pub const fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    /// Return a reference to the owned object, `None` if empty.
    #[inline]
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: the object is alive while `self` owns it.
        self.ptr.map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Return a mutable reference to the owned object, `None` if empty.
    #[inline]
    pub fn as_mut(&mut self) -> Option<&mut T> {
        // SAFETY: the object is alive and `&mut self` is exclusive.
        self.ptr.map(|mut ptr| unsafe { ptr.as_mut() })
    }

    /// Return a reference to the owned object without checking.
    ///
    /// # Safety
    ///
    /// The owner must not be empty.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self) -> &T {
        debug_assert!(self.ptr.is_some(), "UniqueOwner::get_unchecked on empty owner");
        // SAFETY: non-empty is guaranteed by the caller.
        unsafe { self.ptr.unwrap_unchecked().as_ref() }
    }

    /// Return a mutable reference to the owned object without checking.
    ///
    /// # Safety
    ///
    /// The owner must not be empty.
    #[inline(always)]
    pub unsafe fn get_unchecked_mut(&mut self) -> &mut T {
        debug_assert!(self.ptr.is_some(), "UniqueOwner::get_unchecked_mut on empty owner");
        // SAFETY: non-empty is guaranteed by the caller.
        unsafe { self.ptr.unwrap_unchecked().as_mut() }
    }

    /// Return `true` if the owner holds an object.
    #[inline(always)]
    pub const fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    /// Return `true` if the owner holds no object.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// Return the destroy policy.
    #[inline(always)]
    pub const fn destroy_policy(&self) -> &D {
        &self.destroy
    }

    /// Return the destroy policy mutably.
    #[inline(always)]
    pub const fn destroy_policy_mut(&mut self) -> &mut D {
        &mut self.destroy
    }

    /// Exchange objects, destroy policies and cells with `other`.
    ///
    /// Observers stay with the cell they were created from, so they now
    /// follow the object they were watching.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Create an observer of the current cell.
    ///
    /// The observer binds to the cell the owner holds right now. Later
    /// resets of the owner do not rebind it.
    #[inline]
    pub fn observe(&self) -> UniqueWeak<T, K> {
        UniqueWeak::from_parts(self.ptr, self.cell.clone())
    }

    /// Number of observers bound to the current cell.
    #[inline]
    pub fn observer_count(&self) -> usize {
        self.cell.as_ref().map_or(0, |handle| K::handle_count(handle) - 1)
    }

    /// Convert into an owner of another view of the same object with a
    /// different destroy policy.
    ///
    /// The liveness cell moves along, so existing observers keep
    /// observing the object.
    ///
    /// # Safety
    ///
    /// - `map_ptr` must return a pointer to the same object, at the same address.
    /// - The policy returned by `map_destroy` must be able to destroy the
    ///   object through the new pointer.
    pub unsafe fn cast<U: ?Sized, E: Destroy<U>>(
        self,
        map_ptr: impl FnOnce(NonNull<T>) -> NonNull<U>,
        map_destroy: impl FnOnce(D) -> E,
    ) -> UniqueOwner<U, E, K> {
        let (ptr, destroy, cell) = self.into_parts();
        let ptr = ptr.map(|old| {
            let new = map_ptr(old);
            debug_assert!(
                ptr::addr_eq(old.as_ptr(), new.as_ptr()),
                "UniqueOwner::cast moved the object address"
            );
            new
        });
        UniqueOwner {
            ptr,
            destroy: map_destroy(destroy),
            cell,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized, D: Destroy<T>, K: Flavor> Drop for UniqueOwner<T, D, K> {
    fn drop(&mut self) {
        // Dropped last: the cell is cleared after the object is destroyed,
        // even if the destroy policy panics.
        let _guard = ClearGuard::<K>(self.cell.take());
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: `ptr` is owned by `self` and is destroyed only once.
            unsafe { self.destroy.destroy(ptr) };
        }
    }
}

impl<T: ?Sized, D: Destroy<T>, K: Flavor> Deref for UniqueOwner<T, D, K> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the owner is empty.
    #[inline]
    fn deref(&self) -> &T {
        match self.as_ref() {
            Some(value) => value,
            None => AccessError::Empty.handle_error(),
        }
    }
}

impl<T: ?Sized, D: Destroy<T>, K: Flavor> DerefMut for UniqueOwner<T, D, K> {
    /// # Panics
    ///
    /// Panics if the owner is empty.
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        match self.as_mut() {
            Some(value) => value,
            None => AccessError::Empty.handle_error(),
        }
    }
}

impl<T: ?Sized, D: Destroy<T> + Default, K: Flavor> Default for UniqueOwner<T, D, K> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized, K: Flavor> From<Box<T>> for UniqueOwner<T, DefaultDestroy, K> {
    #[inline]
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T: ?Sized, D: Destroy<T>, K: Flavor> fmt::Debug for UniqueOwner<T, D, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueOwner")
            .field("ptr", &self.ptr)
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl<T: ?Sized, D: Destroy<T>, K: Flavor> fmt::Pointer for UniqueOwner<T, D, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(ptr) => fmt::Pointer::fmt(&ptr, f),
            None => fmt::Pointer::fmt(&ptr::null::<u8>(), f),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
