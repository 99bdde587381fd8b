use alloc::boxed::Box;
use core::fmt;
use core::ptr::NonNull;

// -----------------------------------------------------------------------------
// Destroy

/// The operation an owner runs on its object when it gives the object up
/// through ordinary destruction (drop or reset, never release).
///
/// This crate implements `Destroy` for no reference type, so the stock
/// policies are always stored by value:
///
/// ```compile_fail
/// use uw_ptr::{DefaultDestroy, UniqueOwner};
///
/// let mut policy = DefaultDestroy;
/// let owner = unsafe {
///     UniqueOwner::<u32, &mut DefaultDestroy>::from_raw_with(core::ptr::null_mut(), &mut policy)
/// };
/// ```
///
/// The trait is not sealed, and nothing stops a downstream crate from
/// implementing it for a reference such as `&mut MyPolicy`. The owner then
/// borrows that policy for its whole lifetime, which the borrow checker
/// enforces like any other borrow.
pub trait Destroy<T: ?Sized> {
    /// Destroy the object at `ptr`.
    ///
    /// # Safety
    ///
    /// - `ptr` must have been handed to an owner using this policy.
    /// - `ptr` must not have been destroyed or released since.
    unsafe fn destroy(&mut self, ptr: NonNull<T>);
}

// -----------------------------------------------------------------------------
// DefaultDestroy

/// Frees objects allocated by [`Box`].
///
/// # Examples
///
/// ```
/// use uw_ptr::local::UniqueOwner;
///
/// // Uses `DefaultDestroy`.
/// let owner = UniqueOwner::new(String::from("vc"));
/// assert_eq!(owner.len(), 2);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefaultDestroy;

impl<T: ?Sized> Destroy<T> for DefaultDestroy {
    #[inline]
    unsafe fn destroy(&mut self, ptr: NonNull<T>) {
        // SAFETY: owners using `DefaultDestroy` only accept pointers
        // obtained from `Box::into_raw`, see `UniqueOwner::from_raw`.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

// -----------------------------------------------------------------------------
// DestroyFn

/// Adapts a closure into a [`Destroy`] policy.
///
/// # Examples
///
/// ```
/// use core::cell::Cell;
/// use core::ptr::NonNull;
/// use uw_ptr::DestroyFn;
/// use uw_ptr::local::UniqueOwner;
///
/// let calls = Cell::new(0);
/// let policy = DestroyFn(|ptr: NonNull<u32>| {
///     calls.set(calls.get() + 1);
///     drop(unsafe { Box::from_raw(ptr.as_ptr()) });
/// });
///
/// let owner = unsafe {
///     UniqueOwner::<u32, _>::from_raw_with(Box::into_raw(Box::new(5)), policy)
/// };
/// drop(owner);
/// assert_eq!(calls.get(), 1);
/// ```
#[derive(Clone, Copy, Default)]
pub struct DestroyFn<F>(pub F);

impl<T: ?Sized, F: FnMut(NonNull<T>)> Destroy<T> for DestroyFn<F> {
    #[inline]
    unsafe fn destroy(&mut self, ptr: NonNull<T>) {
        (self.0)(ptr);
    }
}

impl<F> fmt::Debug for DestroyFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DestroyFn(..)")
    }
}

// -----------------------------------------------------------------------------
// Tests
