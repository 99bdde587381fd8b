//! Provide atomic types
//!
//! Only the pointer-width atomics are exposed, a liveness cell stores
//! a single address and its reference count lives inside [`Arc`](super::Arc).
//!
//! See the [standard library] for further details.
//!
//! [standard library]: https://doc.rust-lang.org/core/sync/atomic

pub use core::sync::atomic::{AtomicPtr, Ordering};

#[cfg(not(target_has_atomic = "ptr"))]
compile_error!("Platforms without atomic pointers are currently not supported.");
