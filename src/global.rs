use crate::epoch::AtomicEpoch;
use crate::orphan::OrphanList;
use crate::registry::ThreadBlockList;

// the three process-wide singletons, all constructed to the zero state so no
// ordered static initialization is required

pub(crate) static EPOCH: AtomicEpoch = AtomicEpoch::new();
pub(crate) static ORPHANS: OrphanList = OrphanList::new();
pub(crate) static REGISTRY: ThreadBlockList = ThreadBlockList::new();
