//! Concurrent tests for `HazardList`.

use ringfifo_rs::HazardList;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_acquire_is_mutually_exclusive() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 2_000;

    let list = Arc::new(HazardList::<usize>::new());
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|id| {
            let list = Arc::clone(&list);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                // A unique, never-dereferenced address per thread
                let marker = Box::new(id);
                let mine: *const usize = &*marker;
                start.wait();
                for _ in 0..ROUNDS {
                    let guard = list.acquire();
                    guard.remember(mine);
                    thread::yield_now();
                    // Another thread sharing this slot would overwrite it
                    assert_eq!(guard.published(), mine.cast_mut());
                    assert!(list.contains(mine));
                }
                assert!(!list.contains(mine));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(list.len() <= THREADS);
    assert_eq!(list.active_count(), 0);
}

#[test]
fn test_contains_false_after_release() {
    let list = HazardList::<u32>::new();
    let value = 3u32;

    let guard = list.acquire();
    guard.remember(&value);
    assert!(list.contains(&value));

    guard.clear();
    assert!(!list.contains(&value));

    guard.remember(&value);
    guard.release();
    assert!(!list.contains(&value));
}

struct Node {
    value: u64,
    check: u64,
}

static NODES_DROPPED: AtomicUsize = AtomicUsize::new(0);

impl Drop for Node {
    fn drop(&mut self) {
        NODES_DROPPED.fetch_add(1, Ordering::SeqCst);
    }
}

fn node(value: u64) -> *mut Node {
    Box::into_raw(Box::new(Node {
        value,
        check: !value,
    }))
}

#[test]
fn test_retire_defers_free_while_protected() {
    const READERS: usize = 4;
    const UPDATES: u64 = 5_000;

    NODES_DROPPED.store(0, Ordering::SeqCst);
    let list = Arc::new(HazardList::<Node>::with_reclaim_threshold(16));
    let shared = Arc::new(AtomicPtr::new(node(0)));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let list = Arc::clone(&list);
            let shared = Arc::clone(&shared);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last = 0;
                while !done.load(Ordering::Acquire) {
                    let guard = list.acquire();
                    let ptr = guard.protect(&shared);
                    // SAFETY: protected pointers are never freed by reclaim
                    let n = unsafe { &*ptr };
                    assert_eq!(n.check, !n.value, "read a freed node");
                    assert!(n.value >= last, "updates went backwards");
                    last = n.value;
                }
            })
        })
        .collect();

    for value in 1..=UPDATES {
        let old = shared.swap(node(value), Ordering::SeqCst);
        // SAFETY: `old` is unreachable through `shared` and retired once
        unsafe { list.retire(old) };
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }

    list.reclaim();
    assert_eq!(list.retired_count(), 0);
    assert_eq!(NODES_DROPPED.load(Ordering::SeqCst), UPDATES as usize);

    // SAFETY: no thread can reach the final node any more
    unsafe { drop(Box::from_raw(shared.swap(std::ptr::null_mut(), Ordering::SeqCst))) };
    assert_eq!(NODES_DROPPED.load(Ordering::SeqCst), UPDATES as usize + 1);
}
