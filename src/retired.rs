#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use memoffset::offset_of;

type ReclaimFn = unsafe fn(NonNull<Header>);

/// The per-record bookkeeping the engine needs once a record is retired: the
/// intrusive link chaining it into a retire bucket and the deleter injected
/// at retire time.
///
/// Both fields are only ever touched by the record's current exclusive owner
/// (the retiring thread, or the adopter of an orphan), never concurrently.
pub(crate) struct Header {
    next: *mut Header,
    reclaim: Option<ReclaimFn>,
}

impl Default for Header {
    #[inline]
    fn default() -> Self {
        Self { next: ptr::null_mut(), reclaim: None }
    }
}

/// A heap allocation wrapping a value of type `T` together with the
/// [`Header`] the reclamation engine requires.
///
/// All values handed to the engine live inside a `Record`; allocating
/// through [`Owned`][crate::Owned] or [`Atomic`][crate::Atomic] takes care
/// of this invisibly. Pointers handled by the engine always point at the
/// `elem` field, and the record is recovered by offset arithmetic.
pub struct Record<T> {
    header: Header,
    elem: T,
}

impl<T> Record<T> {
    /// Creates a new record wrapping `elem`.
    #[inline]
    pub fn new(elem: T) -> Self {
        Self { header: Header::default(), elem }
    }

    /// Returns a reference to the wrapped value.
    #[inline]
    pub fn elem(&self) -> &T {
        &self.elem
    }

    /// Consumes the record, returning the wrapped value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.elem
    }

    #[inline]
    pub(crate) fn elem_non_null(&mut self) -> NonNull<T> {
        NonNull::from(&mut self.elem)
    }

    /// Calculates the address of the [`Record`] for the given pointer to its
    /// `elem` field.
    ///
    /// # Safety
    ///
    /// `elem` must be a pointer to the `elem` field of a live `Record<T>`.
    #[inline]
    pub(crate) unsafe fn from_raw(elem: *mut T) -> NonNull<Self> {
        let addr = (elem as usize) - Self::offset_elem();
        NonNull::new_unchecked(addr as *mut _)
    }

    #[inline]
    pub(crate) fn offset_header() -> usize {
        offset_of!(Self, header)
    }

    #[inline]
    pub(crate) fn offset_elem() -> usize {
        offset_of!(Self, elem)
    }
}

/// Reconstructs the box for the record containing `header` and drops it.
unsafe fn drop_record<T>(header: NonNull<Header>) {
    let record = (header.as_ptr() as usize - Record::<T>::offset_header()) as *mut Record<T>;
    drop(Box::from_raw(record));
}

/// A type-erased record that has been retired and awaits reclamation.
pub struct Retired(NonNull<Header>);

impl Retired {
    /// Creates a new `Retired` from a pointer to a record's payload,
    /// injecting the deleter that will later drop the record.
    ///
    /// # Safety
    ///
    /// `elem` must point at the payload of a live `Record<T>` that has been
    /// made unreachable for all threads and is retired exactly once. Any
    /// lifetime of `T` is erased; the record may outlive it and may be
    /// dropped by a different thread than the caller.
    #[inline]
    pub unsafe fn new_unchecked<T>(elem: NonNull<T>) -> Self {
        let record = Record::<T>::from_raw(elem.as_ptr());
        // raw field projection: other threads may still hold references
        // into the payload, but never into the header
        let header = ptr::addr_of_mut!((*record.as_ptr()).header);
        (*header).reclaim = Some(drop_record::<T>);
        Self(NonNull::new_unchecked(header))
    }
}

impl fmt::Debug for Retired {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Retired").field("address", &self.0.as_ptr()).finish()
    }
}

/// An intrusive LIFO list of retired records, linked through their headers.
///
/// Owned by exactly one thread at any time; ownership only ever transfers
/// wholesale, through the orphan channel.
pub(crate) struct RetiredList {
    head: *mut Header,
}

impl Default for RetiredList {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl RetiredList {
    #[inline]
    pub const fn new() -> Self {
        Self { head: ptr::null_mut() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    #[inline]
    pub fn push(&mut self, retired: Retired) {
        let header = retired.0;
        unsafe { (*header.as_ptr()).next = self.head };
        self.head = header.as_ptr();
    }

    /// Prepends the entire contents of `other` to this list.
    #[inline]
    pub fn splice(&mut self, other: RetiredList) {
        let mut other = other;
        let spliced = mem::replace(&mut other.head, ptr::null_mut());
        if spliced.is_null() {
            return;
        }

        unsafe {
            let mut tail = spliced;
            while !(*tail).next.is_null() {
                tail = (*tail).next;
            }
            (*tail).next = self.head;
        }
        self.head = spliced;
    }

    /// Invokes the deleter of every record in the list, leaving it empty.
    ///
    /// # Safety
    ///
    /// The safe-epoch condition must hold for every contained record: no
    /// thread can still be inside a critical section in which the record was
    /// reachable.
    pub unsafe fn reclaim_all(&mut self) {
        let mut curr = self.head;
        self.head = ptr::null_mut();

        while let Some(header) = NonNull::new(curr) {
            curr = header.as_ref().next;
            if let Some(reclaim) = header.as_ref().reclaim {
                reclaim(header);
            }
        }
    }
}

impl Drop for RetiredList {
    #[inline]
    fn drop(&mut self) {
        debug_assert!(
            self.is_empty(),
            "dropping a non-empty retire list would leak its records"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
    use std::sync::Arc;

    use super::{Record, Retired, RetiredList};

    struct DropCount(Arc<AtomicUsize>);

    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.fetch_add(1, Relaxed);
        }
    }

    fn retire_new(drops: &Arc<AtomicUsize>) -> Retired {
        let record = Box::leak(Box::new(Record::new(DropCount(Arc::clone(drops)))));
        unsafe { Retired::new_unchecked(NonNull::from(&mut record.elem)) }
    }

    #[test]
    fn reclaim_all_runs_each_deleter_once() {
        let drops = Arc::new(AtomicUsize::new(0));

        let mut list = RetiredList::new();
        assert!(list.is_empty());
        for _ in 0..4 {
            list.push(retire_new(&drops));
        }
        assert!(!list.is_empty());

        unsafe { list.reclaim_all() };
        assert!(list.is_empty());
        assert_eq!(drops.load(Relaxed), 4);
    }

    #[test]
    fn splice_preserves_both_halves() {
        let drops = Arc::new(AtomicUsize::new(0));

        let mut list = RetiredList::new();
        let mut other = RetiredList::new();
        for _ in 0..3 {
            list.push(retire_new(&drops));
            other.push(retire_new(&drops));
        }
        list.splice(other);

        unsafe { list.reclaim_all() };
        assert_eq!(drops.load(Relaxed), 6);
    }

    #[test]
    fn splice_empty_is_a_no_op() {
        let drops = Arc::new(AtomicUsize::new(0));

        let mut list = RetiredList::new();
        list.push(retire_new(&drops));
        list.splice(RetiredList::new());

        unsafe { list.reclaim_all() };
        assert_eq!(drops.load(Relaxed), 1);
    }

    #[test]
    fn record_roundtrip() {
        let record = Box::leak(Box::new(Record::new(7usize)));
        let elem = NonNull::from(&mut record.elem);

        let recovered = unsafe { Record::<usize>::from_raw(elem.as_ptr()) };
        assert_eq!(recovered.as_ptr() as *const _, record as *const Record<usize>);
        assert_eq!(*unsafe { recovered.as_ref() }.elem(), 7);

        drop(unsafe { Box::from_raw(recovered.as_ptr()) });
    }
}
