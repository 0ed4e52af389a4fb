use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// The number of epoch slots (and retire buckets) the engine cycles through.
///
/// Two would suffice for correctness, but a third slot leaves a full epoch of
/// in-flight retirements between "just retired" and "definitely safe",
/// tolerating readers that entered their critical section right before an
/// advance was published.
pub(crate) const EPOCH_COUNT: usize = 3;

/// A value of the global epoch clock.
///
/// Only the value modulo [`EPOCH_COUNT`] is meaningful; it doubles as the
/// index of the retire bucket that epoch's garbage is parked in.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Epoch(usize);

impl Epoch {
    /// The epoch no control block has ever observed.
    ///
    /// Stored in freshly allocated control blocks so that a thread's first
    /// critical-section entry always takes the "new epoch" branch.
    pub const UNOBSERVED: Self = Self(EPOCH_COUNT);

    #[inline]
    pub fn next(self) -> Self {
        Self((self.0 + 1) % EPOCH_COUNT)
    }

    #[inline]
    pub fn prior(self) -> Self {
        Self((self.0 + EPOCH_COUNT - 1) % EPOCH_COUNT)
    }

    /// The retire bucket this epoch selects.
    #[inline]
    pub fn index(self) -> usize {
        debug_assert!(self.0 < EPOCH_COUNT, "epoch slot out of range");
        self.0
    }

    #[inline]
    pub(crate) fn into_raw(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Epoch {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

/// The global epoch counter.
pub(crate) struct AtomicEpoch(AtomicUsize);

impl AtomicEpoch {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> Epoch {
        Epoch(self.0.load(order))
    }

    #[inline]
    pub fn compare_exchange(
        &self,
        current: Epoch,
        new: Epoch,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Epoch, Epoch> {
        self.0
            .compare_exchange(current.0, new.0, success, failure)
            .map(Epoch)
            .map_err(Epoch)
    }
}

impl fmt::Debug for AtomicEpoch {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AtomicEpoch").field("epoch", &self.0.load(Ordering::SeqCst)).finish()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::Ordering::{Relaxed, SeqCst};

    use super::{AtomicEpoch, Epoch, EPOCH_COUNT};

    #[test]
    fn cycle_wraps_after_three() {
        let zero = Epoch::default();
        let mut epoch = zero;
        for _ in 0..EPOCH_COUNT {
            epoch = epoch.next();
        }
        assert_eq!(epoch, zero);
    }

    #[test]
    fn prior_inverts_next() {
        let epoch = Epoch::default().next();
        assert_eq!(epoch.next().prior(), epoch);
        assert_eq!(Epoch::default().prior().index(), EPOCH_COUNT - 1);
    }

    #[test]
    fn unobserved_never_matches_a_live_epoch() {
        let mut epoch = Epoch::default();
        for _ in 0..2 * EPOCH_COUNT {
            assert_ne!(epoch, Epoch::UNOBSERVED);
            epoch = epoch.next();
        }
    }

    #[test]
    fn compare_exchange_advances() {
        let global = AtomicEpoch::new();
        let curr = global.load(SeqCst);

        assert!(global.compare_exchange(curr, curr.next(), SeqCst, Relaxed).is_ok());
        assert_eq!(global.load(SeqCst), curr.next());
        assert!(global.compare_exchange(curr, curr.next(), SeqCst, Relaxed).is_err());
    }
}
