#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use core::cell::{Cell, UnsafeCell};
use core::mem;
use core::sync::atomic::{
    fence,
    Ordering::{Acquire, Relaxed, Release, SeqCst},
};

use crate::config::{Config, CONFIG};
use crate::epoch::{Epoch, EPOCH_COUNT};
use crate::global::{EPOCH, ORPHANS, REGISTRY};
use crate::orphan::Orphan;
use crate::registry::ThreadBlock;
use crate::retired::{Retired, RetiredList};

/// A copyable handle to the current thread's participant state.
///
/// Guards are generic over this seam: with the `std` feature the
/// zero-sized [`DefaultAccess`][crate::DefaultAccess] routes through a
/// thread-local [`Local`], while no_std builds pass an explicit `&Local`.
pub trait LocalAccess: Copy {
    /// Enters the thread's critical section, re-entrantly.
    fn enter_critical(self);

    /// Leaves the thread's critical section, re-entrantly.
    fn leave_critical(self);

    /// Parks `retired` in the bucket for the thread's current epoch.
    fn retire_record(self, retired: Retired);
}

/// A thread's participant in the reclamation protocol.
///
/// Exactly one per thread; all guard operations of a thread funnel through
/// its `Local`. Dropping it hands any still-unreclaimed records to the
/// orphan channel and returns the control block to the registry for reuse.
pub struct Local {
    enter_count: Cell<u32>,
    inner: UnsafeCell<LocalInner>,
}

impl Local {
    /// Creates a new participant.
    ///
    /// The control block is not acquired yet; that happens on the first
    /// critical-section entry.
    #[inline]
    pub fn new() -> Self {
        Self {
            enter_count: Cell::new(0),
            inner: UnsafeCell::new(LocalInner::new()),
        }
    }
}

impl Default for Local {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> LocalAccess for &'a Local {
    #[inline]
    fn enter_critical(self) {
        let count = self.enter_count.get();
        self.enter_count.set(count + 1);

        if count == 0 {
            unsafe { &mut *self.inner.get() }.do_enter_critical();
        }
    }

    #[inline]
    fn leave_critical(self) {
        let count = self.enter_count.get();
        assert!(count > 0, "critical section left more often than entered");
        self.enter_count.set(count - 1);

        if count == 1 {
            unsafe { &*self.inner.get() }.do_leave_critical();
        }
    }

    #[inline]
    fn retire_record(self, retired: Retired) {
        unsafe { &mut *self.inner.get() }.retire_record(retired);
    }
}

impl Drop for Local {
    #[inline]
    fn drop(&mut self) {
        debug_assert_eq!(self.enter_count.get(), 0, "dropping a participant with live guards");
    }
}

/// The single-threaded interior of a [`Local`].
///
/// Only the owning thread ever touches these fields; cross-thread
/// communication goes exclusively through the control block's atomics, the
/// global epoch and the orphan channel.
struct LocalInner {
    config: Config,
    control_block: Option<&'static ThreadBlock>,
    entries_since_update: u32,
    retire_lists: [RetiredList; EPOCH_COUNT],
}

impl LocalInner {
    #[inline]
    fn new() -> Self {
        Self {
            config: CONFIG.try_get().copied().unwrap_or_default(),
            control_block: None,
            entries_since_update: 0,
            retire_lists: [RetiredList::new(), RetiredList::new(), RetiredList::new()],
        }
    }

    fn do_enter_critical(&mut self) {
        let block = match self.control_block {
            Some(block) => block,
            None => {
                let block = REGISTRY.acquire_entry();
                self.control_block = Some(block);
                block
            }
        };
        let state = block.state();

        state.store_in_critical(true, Relaxed);
        // (1) this seq-cst fence orders the store above before the load
        // below; an advancing thread therefore either observes this thread
        // as active during its scan, or this thread observes the epoch that
        // thread published
        fence(SeqCst);

        // (2) this acquire load synchronizes with the release CAS (5),
        // making the writes of whichever thread last advanced the epoch
        // visible here
        let mut epoch = EPOCH.load(Acquire);

        if state.load_epoch(Relaxed) != epoch {
            self.entries_since_update = 0;
        } else if self.entries_since_update == self.config.update_threshold() {
            self.entries_since_update = 0;

            let next = epoch.next();
            if !self.try_advance(epoch, next) {
                return;
            }
            epoch = next;
        } else {
            self.entries_since_update += 1;
            return;
        }

        // a new epoch, either just installed by this thread or observed
        // from another; whatever is parked under its previous incarnation
        // is now two epochs behind every live critical section
        state.store_epoch(epoch, Relaxed);
        unsafe { self.retire_lists[epoch.index()].reclaim_all() };
    }

    #[inline]
    fn do_leave_critical(&self) {
        debug_assert!(self.control_block.is_some(), "not in a critical section");
        if let Some(block) = self.control_block {
            // (3) this release store synchronizes with the acquire fence (4)
            block.state().store_in_critical(false, Release);
        }
    }

    #[inline]
    fn retire_record(&mut self, retired: Retired) {
        debug_assert!(self.control_block.is_some(), "retire requires a critical section");
        let epoch = self
            .control_block
            .map(|block| block.state().load_epoch(Relaxed))
            .unwrap_or_default();

        self.retire_lists[epoch.index()].push(retired);
    }

    /// Attempts to move the global epoch from `curr` to `next`.
    ///
    /// Returns `false` only if some thread is still active in the epoch
    /// before `curr`; `true` means the epoch got updated, not necessarily
    /// by this thread.
    #[cold]
    fn try_advance(&mut self, curr: Epoch, next: Epoch) -> bool {
        let old = curr.prior();

        // relaxed loads suffice for the scan: the race with a concurrently
        // entering reader is arbitrated by the seq-cst fence (1)
        let blocking = REGISTRY.iter().any(|block| {
            let state = block.state();
            state.is_in_critical(Relaxed) && state.load_epoch(Relaxed) == old
        });
        if blocking {
            return false;
        }

        if EPOCH.load(Relaxed) == curr {
            // (4) this acquire fence synchronizes with the release store
            // (3) of every reader the scan above observed as inactive
            fence(Acquire);

            // (5) this release CAS synchronizes with the acquire load (2)
            if EPOCH.compare_exchange(curr, next, Release, Relaxed).is_ok() {
                self.adopt_orphans();
            }
        }

        true
    }

    /// Splices every abandoned orphan into the bucket its dead owner
    /// anchored it to.
    #[cold]
    fn adopt_orphans(&mut self) {
        for orphan in ORPHANS.adopt_all() {
            let (target, lists) = orphan.into_parts();
            for list in lists {
                self.retire_lists[target.index()].splice(list);
            }
        }
    }
}

impl Drop for LocalInner {
    #[cold]
    fn drop(&mut self) {
        let block = match self.control_block {
            Some(block) => block,
            None => return,
        };

        if self.retire_lists.iter().any(|list| !list.is_empty()) {
            // anchoring one epoch behind the current global epoch forces a
            // full cycle before the adopter's bucket comes up for
            // reclamation, so no live critical section can still reference
            // these records by then
            let target = EPOCH.load(Relaxed).prior();
            let lists = mem::take(&mut self.retire_lists);
            ORPHANS.abandon(Box::new(Orphan::new(target, lists)));
        }

        debug_assert!(!block.state().is_in_critical(Relaxed));
        REGISTRY.release_entry(block);
    }
}
