#![doc = include_str!("../README.md")]
#![expect(unsafe_code, reason = "Owning raw pointers is inherently unsafe.")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

// -----------------------------------------------------------------------------
// no_std support

extern crate alloc;

#[cfg(test)]
extern crate std;

// -----------------------------------------------------------------------------
// Modules

mod cell;
mod destroy;
mod error;
mod owner;
mod weak;

// -----------------------------------------------------------------------------
// Top-level exports

pub use cell::{Atomic, AtomicCell, Flavor, LivenessCell, Local, LocalCell};
pub use destroy::{DefaultDestroy, Destroy, DestroyFn};
pub use error::{AccessError, CoerceError};
pub use owner::UniqueOwner;
pub use weak::{UniqueWeak, WeakState};

/// Owners and observers confined to one thread.
pub mod local {
    use crate::{DefaultDestroy, Local};

    /// A [`UniqueOwner`](crate::UniqueOwner) with a [`Local`] cell.
    pub type UniqueOwner<T, D = DefaultDestroy> = crate::UniqueOwner<T, D, Local>;

    /// A [`UniqueWeak`](crate::UniqueWeak) with a [`Local`] cell.
    pub type UniqueWeak<T> = crate::UniqueWeak<T, Local>;
}

/// Owners and observers that may be used from several threads.
///
/// # Examples
///
/// ```
/// use uw_ptr::sync::UniqueOwner;
///
/// let owner = UniqueOwner::new(7u64);
/// let weak = owner.observe();
///
/// std::thread::spawn(move || drop(owner)).join().unwrap();
/// assert!(weak.expired());
/// ```
pub mod sync {
    use crate::{Atomic, DefaultDestroy};

    /// A [`UniqueOwner`](crate::UniqueOwner) with an [`Atomic`] cell.
    pub type UniqueOwner<T, D = DefaultDestroy> = crate::UniqueOwner<T, D, Atomic>;

    /// A [`UniqueWeak`](crate::UniqueWeak) with an [`Atomic`] cell.
    pub type UniqueWeak<T> = crate::UniqueWeak<T, Atomic>;
}

// -----------------------------------------------------------------------------
// Utils for test
