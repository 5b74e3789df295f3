//! Loom-based concurrency tests for ringfifo-rs.
//!
//! Run with: `cargo test -p ringfifo-rs --features loom --test loom_tests --release`
//!
//! Loom explores every interleaving of a small model. The queue's protocol is
//! rebuilt here from loom primitives with a tiny capacity so the state space
//! stays tractable; `loom::cell::UnsafeCell` reports any slot access that is
//! not ordered by the cursor and gate protocol.

#![cfg(feature = "loom")]

use loom::cell::UnsafeCell;
use loom::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

const CAPACITY: usize = 2;

/// Try-lock with the same orderings as the crate's gate.
struct LoomGate(AtomicBool);

impl LoomGate {
    fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fixed-capacity queue with unwrapped cursors and optional gates.
struct LoomQueue {
    write: AtomicU64,
    read: AtomicU64,
    writing: LoomGate,
    reading: LoomGate,
    slots: [UnsafeCell<u64>; CAPACITY],
}

unsafe impl Send for LoomQueue {}
unsafe impl Sync for LoomQueue {}

impl LoomQueue {
    fn new() -> Self {
        Self {
            write: AtomicU64::new(0),
            read: AtomicU64::new(0),
            writing: LoomGate::new(),
            reading: LoomGate::new(),
            slots: [UnsafeCell::new(0), UnsafeCell::new(0)],
        }
    }

    /// Ungated push; caller is the only writer.
    fn push(&self, value: u64) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if (write - read) as usize == CAPACITY {
            return false;
        }
        let idx = (write % CAPACITY as u64) as usize;
        self.slots[idx].with_mut(|p| unsafe { *p = value });
        self.write.store(write + 1, Ordering::Release);
        true
    }

    /// Ungated pop; caller is the only reader.
    fn pop(&self) -> Option<u64> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        let idx = (read % CAPACITY as u64) as usize;
        let value = self.slots[idx].with(|p| unsafe { *p });
        self.read.store(read + 1, Ordering::Release);
        Some(value)
    }

    /// `None` means the gate was busy.
    fn gated_push(&self, value: u64) -> Option<bool> {
        if !self.writing.try_lock() {
            return None;
        }
        let pushed = self.push(value);
        self.writing.unlock();
        Some(pushed)
    }

    /// Outer `None` means the gate was busy.
    fn gated_pop(&self) -> Option<Option<u64>> {
        if !self.reading.try_lock() {
            return None;
        }
        let value = self.pop();
        self.reading.unlock();
        Some(value)
    }
}

/// Values published by the writer are seen intact and in order.
#[test]
fn loom_spsc_publish_order() {
    loom::model(|| {
        let queue = Arc::new(LoomQueue::new());
        let producer_queue = Arc::clone(&queue);

        let producer = thread::spawn(move || {
            assert!(producer_queue.push(1));
            assert!(producer_queue.push(2));
        });

        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(v) = queue.pop() {
                received.push(v);
            }
            thread::yield_now();
        }

        producer.join().unwrap();
        while let Some(v) = queue.pop() {
            received.push(v);
        }
        assert_eq!(received, vec![1, 2]);
    });
}

/// A full queue rejects the writer until the reader hands a slot back, and
/// the reused slot is never read and written at the same time.
#[test]
fn loom_spsc_slot_reuse_after_full() {
    loom::model(|| {
        let queue = Arc::new(LoomQueue::new());
        assert!(queue.push(10));
        assert!(queue.push(11));
        assert!(!queue.push(12));

        let consumer_queue = Arc::clone(&queue);
        let consumer = thread::spawn(move || consumer_queue.pop());

        // Either still full or the freed slot is reused
        let pushed = queue.push(12);
        assert_eq!(consumer.join().unwrap(), Some(10));

        assert_eq!(queue.pop(), Some(11));
        if pushed {
            assert_eq!(queue.pop(), Some(12));
        }
        assert_eq!(queue.pop(), None);
    });
}

/// Two gated writers never both enter the slot path; every accepted value
/// is delivered exactly once.
#[test]
fn loom_gated_writers_are_exclusive() {
    loom::model(|| {
        let queue = Arc::new(LoomQueue::new());
        let accepted = Arc::new(AtomicUsize::new(0));

        let writers: Vec<_> = (0..2u64)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let accepted = Arc::clone(&accepted);
                thread::spawn(move || {
                    if queue.gated_push(id + 1) == Some(true) {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }

        let mut delivered = Vec::new();
        while let Some(v) = queue.pop() {
            delivered.push(v);
        }
        assert_eq!(delivered.len(), accepted.load(Ordering::SeqCst));
        assert!(!delivered.is_empty(), "one writer always wins the gate");
        delivered.sort_unstable();
        delivered.dedup();
        assert_eq!(delivered.len(), accepted.load(Ordering::SeqCst));
    });
}

/// Two gated readers never take the same value.
#[test]
fn loom_gated_readers_never_duplicate() {
    loom::model(|| {
        let queue = Arc::new(LoomQueue::new());
        assert!(queue.push(7));

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.gated_pop().flatten())
            })
            .collect();

        let got: Vec<u64> = readers
            .into_iter()
            .filter_map(|r| r.join().unwrap())
            .collect();
        assert!(got.len() <= 1, "value dequeued twice: {:?}", got);
        if got.is_empty() {
            assert_eq!(queue.pop(), Some(7));
        }
    });
}

/// Reader-count gate with a resizing flag in the top bit.
struct LoomResizeGate(AtomicUsize);

const RESIZING: usize = 1 << (usize::BITS - 1);

impl LoomResizeGate {
    fn try_share(&self) -> bool {
        let mut state = self.0.load(Ordering::Relaxed);
        loop {
            if state & RESIZING != 0 {
                return false;
            }
            match self.0.compare_exchange_weak(
                state,
                state + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => state = actual,
            }
        }
    }

    fn unshare(&self) {
        self.0.fetch_sub(1, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        self.0.fetch_or(RESIZING, Ordering::Acquire);
        while self.0.load(Ordering::Acquire) != RESIZING {
            thread::yield_now();
        }
    }

    fn unlock_exclusive(&self) {
        self.0.fetch_and(!RESIZING, Ordering::Release);
    }
}

/// A reader holding shared access never overlaps the resizer's rewrite of
/// the storage, and a reader admitted after the resize sees the new content.
#[test]
fn loom_resize_excludes_readers() {
    loom::model(|| {
        let gate = Arc::new(LoomResizeGate(AtomicUsize::new(0)));
        let storage = Arc::new(UnsafeCell::new(1u64));

        let reader = {
            let gate = Arc::clone(&gate);
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                if gate.try_share() {
                    let v = storage.with(|p| unsafe { *p });
                    gate.unshare();
                    assert!(v == 1 || v == 2);
                    Some(v)
                } else {
                    None
                }
            })
        };

        gate.lock_exclusive();
        storage.with_mut(|p| unsafe { *p = 2 });
        gate.unlock_exclusive();

        reader.join().unwrap();
        assert!(gate.try_share());
        assert_eq!(storage.with(|p| unsafe { *p }), 2);
        gate.unshare();
    });
}
