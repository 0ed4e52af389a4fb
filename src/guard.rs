//! The guarded-pointer protocol: scoped pins on individual pointer values,
//! generic over how the thread's participant is reached.

#[cfg(feature = "std")]
use std::error::Error;

use core::fmt;
use core::mem::ManuallyDrop;
use core::sync::atomic::Ordering::{self, Relaxed};

use typenum::Unsigned;

use crate::atomic::Atomic;
use crate::local::LocalAccess;
use crate::pointer::MarkedPtr;
use crate::retired::Retired;

#[cfg(feature = "std")]
use crate::default::DefaultAccess;

/// A scoped pin on a single (possibly null, possibly tagged) pointer value.
///
/// While a guard holds a non-null pointer, its thread is inside a critical
/// section and no record the pointer could still reference is reclaimed.
/// Cloning yields a second, independent pin on the same value; moving
/// transfers the pin without touching the critical-section count; dropping
/// releases it.
#[must_use]
pub struct Guard<T, N: Unsigned, L: LocalAccess> {
    ptr: MarkedPtr<T, N>,
    local_access: L,
}

impl<T, N: Unsigned, L: LocalAccess> Guard<T, N, L> {
    /// Creates a null guard using the given participant access.
    #[inline]
    pub fn with_local_access(local_access: L) -> Self {
        Self { ptr: MarkedPtr::null(), local_access }
    }

    /// Creates a guard pinning `ptr`, which was obtained by other means
    /// (for example as a compare-exchange result).
    #[inline]
    pub fn pin_with_local_access(ptr: MarkedPtr<T, N>, local_access: L) -> Self {
        if !ptr.is_null() {
            local_access.enter_critical();
        }

        Self { ptr, local_access }
    }

    /// Atomically loads from `atomic` and pins the loaded value.
    ///
    /// The given `order` is honored for the trusted load; its acquire
    /// flavor is what synchronizes the reader with the writer that
    /// published the pointer.
    #[inline]
    pub fn acquire(&mut self, atomic: &Atomic<T, N>, order: Ordering) {
        // the relaxed pre-load is only a fast-path null check; the load
        // that is trusted is the one performed after the critical section
        // has been published
        if atomic.load_raw(Relaxed).is_null() {
            self.reset();
            return;
        }

        if self.ptr.is_null() {
            self.local_access.enter_critical();
        }
        self.ptr = atomic.load_raw(order);
        if self.ptr.is_null() {
            self.local_access.leave_critical();
        }
    }

    /// Like [`acquire`][Guard::acquire], but only pins the loaded value if
    /// it equals `expected` (pointer and tag); otherwise the guard is reset.
    ///
    /// `Ok` is returned exactly if the loaded value equals `expected`, so a
    /// null load against a null `expected` reports `Ok` with a null guard.
    #[inline]
    pub fn acquire_if_equal(
        &mut self,
        atomic: &Atomic<T, N>,
        expected: MarkedPtr<T, N>,
        order: Ordering,
    ) -> Result<(), NotEqualError> {
        let actual = atomic.load_raw(Relaxed);
        if actual.is_null() || actual != expected {
            self.reset();
            return if actual == expected { Ok(()) } else { Err(NotEqualError) };
        }

        if self.ptr.is_null() {
            self.local_access.enter_critical();
        }
        self.ptr = atomic.load_raw(order);
        if self.ptr.is_null() || self.ptr != expected {
            self.local_access.leave_critical();
            self.ptr = MarkedPtr::null();
        }

        if self.ptr == expected {
            Ok(())
        } else {
            Err(NotEqualError)
        }
    }

    /// Releases the pin, leaving the guard null.
    #[inline]
    pub fn reset(&mut self) {
        if !self.ptr.is_null() {
            self.local_access.leave_critical();
        }
        self.ptr = MarkedPtr::null();
    }

    /// Hands the pinned record to the engine for deferred destruction and
    /// releases the pin.
    ///
    /// # Safety
    ///
    /// The guard must hold a non-null pointer to a record allocated through
    /// this crate that has been made unreachable for all threads and is
    /// retired exactly once. The record may be dropped by another thread,
    /// and its `Drop` implementation must not itself enter the reclamation
    /// engine.
    #[inline]
    pub unsafe fn retire(self)
    where
        T: Send + 'static,
    {
        self.retire_unchecked();
    }

    /// Like [`retire`][Guard::retire], without the bounds making the
    /// cross-thread drop and lifetime erasure safe to rely on.
    ///
    /// # Safety
    ///
    /// As for [`retire`][Guard::retire]; additionally the caller must
    /// ensure `T` outlives its reclamation and tolerates being dropped on
    /// another thread.
    pub unsafe fn retire_unchecked(self) {
        let guard = ManuallyDrop::new(self);
        debug_assert!(!guard.ptr.is_null(), "only a non-null pointer can be retired");

        if let Some(elem) = guard.ptr.decompose_non_null() {
            guard.local_access.retire_record(Retired::new_unchecked(elem));
            guard.local_access.leave_critical();
        }
    }

    /// Returns the pinned marked pointer.
    #[inline]
    pub fn as_marked_ptr(&self) -> MarkedPtr<T, N> {
        self.ptr
    }

    /// Returns the tag bits of the pinned value.
    #[inline]
    pub fn tag(&self) -> usize {
        self.ptr.decompose_tag()
    }

    /// Returns `true` if the guard pins nothing.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Dereferences the pinned pointer.
    ///
    /// # Safety
    ///
    /// The pointer must have been loaded from a location the publishing
    /// writer released it to, with at least acquire ordering.
    #[inline]
    pub unsafe fn as_ref(&self) -> Option<&T> {
        self.ptr.as_ref()
    }
}

#[cfg(feature = "std")]
impl<T, N: Unsigned> Guard<T, N, DefaultAccess> {
    /// Creates a null guard bound to the current thread's participant.
    #[inline]
    pub fn new() -> Self {
        Self::with_local_access(DefaultAccess::default())
    }

    /// Creates a guard pinning `ptr` on the current thread's participant.
    #[inline]
    pub fn pin(ptr: MarkedPtr<T, N>) -> Self {
        Self::pin_with_local_access(ptr, DefaultAccess::default())
    }
}

impl<T, N: Unsigned, L: LocalAccess> Clone for Guard<T, N, L> {
    #[inline]
    fn clone(&self) -> Self {
        if !self.ptr.is_null() {
            self.local_access.enter_critical();
        }

        Self { ptr: self.ptr, local_access: self.local_access }
    }
}

impl<T, N: Unsigned, L: LocalAccess + Default> Default for Guard<T, N, L> {
    #[inline]
    fn default() -> Self {
        Self::with_local_access(L::default())
    }
}

impl<T, N: Unsigned, L: LocalAccess> Drop for Guard<T, N, L> {
    #[inline]
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T, N: Unsigned, L: LocalAccess> fmt::Debug for Guard<T, N, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (ptr, tag) = self.ptr.decompose();
        f.debug_struct("Guard").field("ptr", &ptr).field("tag", &tag).finish()
    }
}

/// The comparison result of a failed
/// [`acquire_if_equal`][Guard::acquire_if_equal].
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct NotEqualError;

impl fmt::Display for NotEqualError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "acquired value does not match `expected`")
    }
}

#[cfg(feature = "std")]
impl Error for NotEqualError {}
