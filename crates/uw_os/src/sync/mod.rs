//! Synchronization primitives used by the thread-safe liveness cells.
//!
//! - [`Arc`] and [`Weak`] are re-exported from `alloc`, they are the same
//!   types as in the standard library.
//! - [`atomic`] re-exports the atomic types of `core` that the cells rely on.
//!
//! Specifically, if the target platform does not support atomic pointers,
//! compilation will fail, as we rely on `Arc`, which requires it.
//!
//! See the [standard library] for further details.
//!
//! [standard library]: https://doc.rust-lang.org/std/sync/index.html

// -----------------------------------------------------------------------------
// Modules

pub mod atomic;

// -----------------------------------------------------------------------------
// Exports

pub use alloc::sync::{Arc, Weak};

// -----------------------------------------------------------------------------
// Tests
