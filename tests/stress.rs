use std::mem::ManuallyDrop;
use std::sync::atomic::{
    AtomicUsize,
    Ordering::{Acquire, Relaxed, Release},
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use epochal::{acquire_guard, Atomic, Guard, MarkedPtr, Owned};

// These tests run with the default update threshold and rely on exact
// reclamation counts after the workers are done, so they must not overlap.
static SERIAL: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Relaxed);
    }
}

fn tick() {
    let mut dummy = 0usize;
    let guard: Guard<usize> = Guard::pin(MarkedPtr::new(&mut dummy));
    drop(guard);
}

/// Ticks until `drops` reaches `expected`; panics if it never does.
///
/// With the default threshold a single surviving thread needs a few hundred
/// entries per full epoch cycle, so the bound is generous, not tight.
fn drain(drops: &Arc<AtomicUsize>, expected: usize) {
    for _ in 0..100_000 {
        if drops.load(Relaxed) == expected {
            break;
        }
        tick();
    }
    assert_eq!(drops.load(Relaxed), expected);
}

#[test]
fn concurrent_counter_churn_reclaims_every_node() {
    let _serial = lock();
    const THREADS: usize = 4;
    const ITER: usize = 1024;

    struct Node {
        value: usize,
        _tracked: Tracked,
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let node = |value: usize| Node { value, _tracked: Tracked(Arc::clone(&drops)) };

    let mut counter = Atomic::<Node>::new(node(0));
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ITER {
                    loop {
                        let guard = acquire_guard(&counter, Acquire);
                        let value = unsafe { guard.as_ref() }.unwrap().value;

                        let new = Owned::<_>::new(node(value + 1)).into_marked_ptr();
                        match counter.compare_exchange(guard.as_marked_ptr(), new, Release, Relaxed)
                        {
                            Ok(_) => {
                                unsafe { guard.retire() };
                                break;
                            }
                            Err(_) => drop(unsafe { Owned::<Node>::from_marked_ptr(new) }),
                        }
                    }
                }
            });
        }
    });

    let last = counter.take().unwrap();
    assert_eq!(last.value, THREADS * ITER);
    drop(last);

    // every increment retired its predecessor, plus the final node
    drain(&drops, THREADS * ITER + 1);
}

#[test]
fn treiber_stack_churn_reclaims_every_node() {
    let _serial = lock();
    const THREADS: usize = 8;
    const ITER: usize = 1024;

    struct Node {
        data: ManuallyDrop<usize>,
        next: MarkedPtr<Node>,
        _tracked: Tracked,
    }

    // `next` is written before the node is published and read-only after
    unsafe impl Send for Node {}
    unsafe impl Sync for Node {}

    struct Stack {
        head: Atomic<Node>,
    }

    impl Stack {
        fn push(&self, data: usize, drops: &Arc<AtomicUsize>) {
            let mut owned = Owned::<_>::new(Node {
                data: ManuallyDrop::new(data),
                next: MarkedPtr::null(),
                _tracked: Tracked(Arc::clone(drops)),
            });

            loop {
                let head = self.head.load_raw(Relaxed);
                owned.next = head;
                let ptr = owned.into_marked_ptr();

                match self.head.compare_exchange(head, ptr, Release, Relaxed) {
                    Ok(_) => return,
                    Err(_) => owned = unsafe { Owned::from_marked_ptr(ptr) },
                }
            }
        }

        fn try_pop(&self) -> Option<usize> {
            loop {
                let guard = acquire_guard(&self.head, Acquire);
                let head = guard.as_marked_ptr();
                let next = unsafe { guard.as_ref() }?.next;

                if self.head.compare_exchange(head, next, Relaxed, Relaxed).is_ok() {
                    // the winning CAS made `head` unreachable; its payload
                    // is taken out before the node is retired
                    let data =
                        unsafe { ManuallyDrop::take(&mut (*head.decompose_ptr()).data) };
                    unsafe { guard.retire_unchecked() };
                    return Some(data);
                }
            }
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let stack = Stack { head: Atomic::null() };

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for i in 0..ITER {
                    stack.push(i, &drops);
                    assert!(stack.try_pop().is_some());
                }
            });
        }
    });

    assert!(stack.try_pop().is_none());
    drain(&drops, THREADS * ITER);
}
