//! Epoch-based memory reclamation for lock-free data structures.
//!
//! A writer that unlinks a node from a shared structure cannot free it
//! immediately: another thread may still be dereferencing a pointer it
//! loaded just before the unlink. This crate decides when such nodes are
//! safe to destroy, without making readers pay per-access synchronization.
//!
//! Readers pin pointers with a [`Guard`]; while a thread holds at least one
//! non-null guard it is inside a *critical section*, advertised through its
//! control block. A global epoch counter cycles through three slots, and a
//! retired record is parked in the bucket of the epoch it was retired under.
//! The epoch only advances once no thread is still active in the slot that
//! would thereby come up for reclamation, so by the time a bucket is
//! emptied, every critical section that could have observed its records has
//! ended. Threads that exit while still holding retired records deposit
//! them in an orphan channel, where the next thread to advance the epoch
//! adopts them.
//!
//! Reclamation progress depends on epoch advances, which are attempted
//! every `(U + 1)`-th critical-section entry per thread; `U` is the update
//! threshold in [`Config`]. A reader parked inside a critical section
//! indefinitely blocks reclamation indefinitely; this is inherent to
//! epoch-based schemes.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::Ordering;
//!
//! use epochal::{acquire_guard, Atomic};
//!
//! let mut shared = Atomic::<i32>::new(42);
//!
//! let guard = acquire_guard(&shared, Ordering::Acquire);
//! assert_eq!(unsafe { guard.as_ref() }.copied(), Some(42));
//! drop(guard);
//!
//! // single-threaded teardown bypasses the engine
//! drop(shared.take());
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

#[cfg(not(feature = "std"))]
extern crate alloc;

mod align;
mod atomic;
mod config;
#[cfg(feature = "std")]
mod default;
mod epoch;
mod global;
pub mod guard;
mod local;
mod orphan;
mod pointer;
mod registry;
mod retired;

use cfg_if::cfg_if;

pub use typenum;

pub use crate::atomic::{Atomic, Owned};
pub use crate::config::{Config, ConfigBuilder, CONFIG};
pub use crate::guard::NotEqualError;
pub use crate::local::{Local, LocalAccess};
pub use crate::pointer::{AtomicMarkedPtr, MarkedPtr};
pub use crate::retired::{Record, Retired};

#[cfg(feature = "std")]
pub use crate::default::DefaultAccess;

cfg_if! {
    if #[cfg(feature = "std")] {
        /// A guard bound to the current thread's implicit participant.
        pub type Guard<T, N = typenum::U0> = crate::guard::Guard<T, N, DefaultAccess>;
    } else {
        /// A guard bound to an explicitly managed participant.
        pub type LocalGuard<'a, T, N = typenum::U0> = crate::guard::Guard<T, N, &'a Local>;
    }
}

/// Loads from `atomic` and returns a guard pinning the loaded value.
///
/// Equivalent to constructing a null [`Guard`] and calling
/// [`acquire`][crate::guard::Guard::acquire] on it.
#[cfg(feature = "std")]
#[inline]
pub fn acquire_guard<T, N: typenum::Unsigned>(
    atomic: &Atomic<T, N>,
    order: core::sync::atomic::Ordering,
) -> Guard<T, N> {
    let mut guard = Guard::new();
    guard.acquire(atomic, order);
    guard
}
