#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use core::mem;
use core::ptr::{self, NonNull};
use core::sync::atomic::{
    AtomicPtr,
    Ordering::{Acquire, Relaxed, Release},
};

use crate::epoch::{Epoch, EPOCH_COUNT};
use crate::retired::RetiredList;

/// The retire buckets of an exited thread, bundled for adoption.
///
/// `target_epoch` is the epoch one behind the global epoch at the moment the
/// owning thread died. Splicing all three lists into an adopter's bucket at
/// that index re-anchors them a full cycle away from reclamation, so the
/// three-epoch horizon holds for every contained record.
pub(crate) struct Orphan {
    next: *mut Orphan,
    target_epoch: Epoch,
    retire_lists: [RetiredList; EPOCH_COUNT],
}

impl Orphan {
    #[inline]
    pub fn new(target_epoch: Epoch, retire_lists: [RetiredList; EPOCH_COUNT]) -> Self {
        Self { next: ptr::null_mut(), target_epoch, retire_lists }
    }

    #[inline]
    pub fn into_parts(mut self: Box<Self>) -> (Epoch, [RetiredList; EPOCH_COUNT]) {
        (self.target_epoch, mem::take(&mut self.retire_lists))
    }
}

impl Drop for Orphan {
    #[inline]
    fn drop(&mut self) {
        // adoption empties the lists through `into_parts`; anything left
        // here was never adopted and its safe epoch has long passed
        for list in &mut self.retire_lists {
            unsafe { list.reclaim_all() };
        }
    }
}

/// The lock-free stash where exiting threads deposit their orphans.
pub(crate) struct OrphanList {
    head: AtomicPtr<Orphan>,
}

impl OrphanList {
    #[inline]
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Pushes `orphan` for some surviving thread to adopt.
    #[inline]
    pub fn abandon(&self, orphan: Box<Orphan>) {
        let orphan = Box::into_raw(orphan);
        loop {
            let head = self.head.load(Relaxed);
            unsafe { (*orphan).next = head };

            if self.head.compare_exchange_weak(head, orphan, Release, Relaxed).is_ok() {
                return;
            }
        }
    }

    /// Takes the entire stash, transferring ownership of every orphan to
    /// the caller.
    #[inline]
    pub fn adopt_all(&self) -> OrphanIter {
        OrphanIter { curr: self.head.swap(ptr::null_mut(), Acquire) }
    }
}

pub(crate) struct OrphanIter {
    curr: *mut Orphan,
}

impl Iterator for OrphanIter {
    type Item = Box<Orphan>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        NonNull::new(self.curr).map(|ptr| {
            let orphan = unsafe { Box::from_raw(ptr.as_ptr()) };
            self.curr = orphan.next;
            orphan
        })
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
    use std::sync::Arc;

    use crate::atomic::Owned;
    use crate::epoch::Epoch;
    use crate::retired::{Retired, RetiredList};

    use super::{Orphan, OrphanList};

    struct DropCount(Arc<AtomicUsize>);

    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.fetch_add(1, Relaxed);
        }
    }

    fn orphan_with(n: usize, target: Epoch, drops: &Arc<AtomicUsize>) -> Box<Orphan> {
        let mut lists = [RetiredList::new(), RetiredList::new(), RetiredList::new()];
        for i in 0..n {
            let elem = Owned::<_>::new(DropCount(Arc::clone(drops))).into_marked_ptr();
            let elem = NonNull::new(elem.decompose_ptr()).unwrap();
            lists[i % 3].push(unsafe { Retired::new_unchecked(elem) });
        }
        Box::new(Orphan::new(target, lists))
    }

    #[test]
    fn adopt_all_drains_the_stash() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stash = OrphanList::new();

        stash.abandon(orphan_with(4, Epoch::default(), &drops));
        stash.abandon(orphan_with(3, Epoch::default().next(), &drops));

        let adopted: Vec<_> = stash.adopt_all().collect();
        assert_eq!(adopted.len(), 2);
        // LIFO: the most recently abandoned orphan comes out first
        assert_eq!(adopted[0].target_epoch, Epoch::default().next());
        assert!(stash.adopt_all().next().is_none());

        // unadopted orphans reclaim their contents when dropped
        drop(adopted);
        assert_eq!(drops.load(Relaxed), 7);
    }

    #[test]
    fn into_parts_transfers_the_lists() {
        let drops = Arc::new(AtomicUsize::new(0));
        let orphan = orphan_with(5, Epoch::default(), &drops);

        let (target, mut lists) = orphan.into_parts();
        assert_eq!(target, Epoch::default());
        assert_eq!(drops.load(Relaxed), 0);

        for list in &mut lists {
            unsafe { list.reclaim_all() };
        }
        assert_eq!(drops.load(Relaxed), 5);
    }
}
