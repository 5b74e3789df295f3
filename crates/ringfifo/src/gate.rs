//! Exclusion primitives used by the queue and the hazard list.
//!
//! [`Gate`] is a one-flag try-lock: a single compare-and-set either claims it
//! or reports contention. [`ResizeGate`] lets any number of readers share the
//! storage while a resizing writer can take it exclusively.

use crate::Backoff;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Boolean try-lock. Owned per instance, never shared between queues.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    held: AtomicBool,
}

impl Gate {
    pub(crate) const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// One compare-and-set. `None` means another thread holds the gate.
    ///
    /// Acquire on success pairs with the Release in `GateGuard::drop`, so the
    /// new holder sees every write made by the previous one.
    #[inline]
    pub(crate) fn try_lock(&self) -> Option<GateGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    /// Spins with backoff until the gate is claimed.
    pub(crate) fn lock(&self) -> GateGuard<'_> {
        let mut backoff = Backoff::new();
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            // Test before the next CAS so waiters do not bounce the cache line.
            while self.held.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// Releases the gate on drop.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub(crate) struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Drop for GateGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.gate.held.store(false, Ordering::Release);
    }
}

/// Shared/exclusive token guarding the storage of a growable queue.
///
/// The low bits count readers currently inside the storage; the top bit
/// marks a resize. Readers never wait: they get `None` while a resize is in
/// progress and report `Busy`. The resizing writer raises the flag, then
/// waits for the in-flight readers to leave.
#[derive(Debug, Default)]
pub(crate) struct ResizeGate {
    state: AtomicUsize,
}

const RESIZING: usize = 1 << (usize::BITS - 1);

impl ResizeGate {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    /// Enters as a reader unless a resize is running.
    #[inline]
    pub(crate) fn try_share(&self) -> Option<SharedAccess<'_>> {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            if current & RESIZING != 0 {
                return None;
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(SharedAccess { gate: self }),
                Err(actual) => current = actual,
            }
        }
    }

    /// Takes the storage exclusively.
    ///
    /// Callers must already be serialized against each other (single writer
    /// or writer gate held); only readers are waited out here.
    pub(crate) fn lock_exclusive(&self) -> ExclusiveAccess<'_> {
        let previous = self.state.fetch_or(RESIZING, Ordering::Acquire);
        debug_assert_eq!(previous & RESIZING, 0, "nested resize");

        let mut backoff = Backoff::new();
        while self.state.load(Ordering::Acquire) & !RESIZING != 0 {
            backoff.snooze();
        }
        ExclusiveAccess { gate: self }
    }

    #[cfg(test)]
    pub(crate) fn readers(&self) -> usize {
        self.state.load(Ordering::Relaxed) & !RESIZING
    }
}

/// A reader's presence inside the storage.
#[must_use = "shared access ends as soon as the guard is dropped"]
pub(crate) struct SharedAccess<'a> {
    gate: &'a ResizeGate,
}

impl Drop for SharedAccess<'_> {
    #[inline]
    fn drop(&mut self) {
        self.gate.state.fetch_sub(1, Ordering::Release);
    }
}

/// The resizer's exclusive hold on the storage.
#[must_use = "exclusive access ends as soon as the guard is dropped"]
pub(crate) struct ExclusiveAccess<'a> {
    gate: &'a ResizeGate,
}

impl Drop for ExclusiveAccess<'_> {
    fn drop(&mut self) {
        self.gate.state.fetch_and(!RESIZING, Ordering::Release);
    }
}
