//! Hazard-pointer list for deferred reclamation.
//!
//! A thread that is about to dereference shared memory [`acquire`]s a slot,
//! publishes the address with [`HazardGuard::remember`] (or the validating
//! [`HazardGuard::protect`]), and releases the slot when done. A thread that
//! wants to free memory [`retire`]s the pointer instead; retired pointers are
//! freed by [`reclaim`] once no active slot publishes them.
//!
//! Slots are allocated on demand, linked into a push-front list and recycled
//! forever. Memory held by slots is bounded by the high-water mark of
//! simultaneous protections and is only returned when the list is dropped.
//!
//! [`acquire`]: HazardList::acquire
//! [`retire`]: HazardList::retire
//! [`reclaim`]: HazardList::reclaim

use crate::gate::Gate;
use crate::trace::trace;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Retired pointers accumulated before `retire` triggers a scan on its own.
pub const DEFAULT_RECLAIM_THRESHOLD: usize = 64;

struct HazardSlot<T> {
    /// Set once before the slot is published, immutable afterwards.
    next: *mut HazardSlot<T>,
    is_active: AtomicBool,
    data_ptr: AtomicPtr<T>,
}

impl<T> HazardSlot<T> {
    fn new_active() -> Self {
        Self {
            next: ptr::null_mut(),
            is_active: AtomicBool::new(true),
            data_ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

/// A pointer waiting to be freed.
struct Retired<T>(NonNull<T>);

// Safety: a retired pointer is uniquely owned by the retired list.
unsafe impl<T: Send> Send for Retired<T> {}

/// Growable list of hazard slots plus the deferred-free list that consults it.
pub struct HazardList<T> {
    head: AtomicPtr<HazardSlot<T>>,
    /// Serializes appends; scans and claims never take it.
    appending: Gate,
    slots: AtomicUsize,
    retired: Mutex<Vec<Retired<T>>>,
    reclaim_threshold: usize,
}

// Safety: slots are only mutated through atomics and are never freed while
// `&self` is reachable. Retired values are dropped on whichever thread runs
// `reclaim`, hence `T: Send`.
unsafe impl<T: Send> Send for HazardList<T> {}
unsafe impl<T: Send> Sync for HazardList<T> {}

impl<T> HazardList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::with_reclaim_threshold(DEFAULT_RECLAIM_THRESHOLD)
    }

    /// Creates an empty list that scans once `threshold` pointers are retired.
    pub fn with_reclaim_threshold(threshold: usize) -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            appending: Gate::new(),
            slots: AtomicUsize::new(0),
            retired: Mutex::new(Vec::new()),
            reclaim_threshold: threshold.max(1),
        }
    }

    fn iter(&self) -> SlotIter<'_, T> {
        SlotIter {
            current: self.head.load(Ordering::Acquire),
            _list: self,
        }
    }

    /// Claims a slot for the calling thread.
    ///
    /// Reuses an inactive slot when one can be claimed with a single CAS;
    /// otherwise allocates a new one and links it in under the append gate.
    pub fn acquire(&self) -> HazardGuard<'_, T> {
        for slot in self.iter() {
            if !slot.is_active.load(Ordering::Relaxed)
                && slot
                    .is_active
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                return HazardGuard { slot };
            }
        }

        let slot = Box::into_raw(Box::new(HazardSlot::new_active()));
        {
            let _gate = self.appending.lock();
            // SAFETY: `slot` is not yet reachable by any other thread.
            unsafe { (*slot).next = self.head.load(Ordering::Relaxed) };
            self.head.store(slot, Ordering::Release);
        }
        self.slots.fetch_add(1, Ordering::Relaxed);
        trace!(slots = self.len(), "hazard slot allocated");

        // SAFETY: slots live until the list is dropped, which the guard's
        // borrow of `self` prevents.
        HazardGuard {
            slot: unsafe { &*slot },
        }
    }

    /// Returns true if an active slot currently publishes `ptr`.
    ///
    /// A reclaiming thread must treat `true` as "not yet safe to free".
    /// Pointers are compared by address only, so every boxed zero-sized
    /// value aliases every other one.
    pub fn contains(&self, ptr: *const T) -> bool {
        if ptr.is_null() {
            return false;
        }
        self.iter().any(|slot| {
            slot.is_active.load(Ordering::Acquire) && slot.data_ptr.load(Ordering::SeqCst) == ptr.cast_mut()
        })
    }

    /// Defers freeing `ptr` until no hazard slot publishes it.
    ///
    /// Runs [`reclaim`](Self::reclaim) once the retired list reaches the
    /// configured threshold. Protection is matched by address, so a
    /// zero-sized value is kept while any slot publishes the same dangling
    /// address.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw`, must already be unreachable for
    /// threads that have not protected it, and must be retired only once.
    pub unsafe fn retire(&self, ptr: *mut T) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        let pending = {
            let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
            retired.push(Retired(ptr));
            retired.len()
        };
        if pending >= self.reclaim_threshold {
            self.reclaim();
        }
    }

    /// Frees every retired pointer that no active slot publishes.
    /// Returns how many were freed.
    ///
    /// The values are dropped after the retired list is unlocked, so a
    /// `T::drop` may itself retire into this list.
    pub fn reclaim(&self) -> usize {
        let unprotected = {
            let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
            if retired.is_empty() {
                return 0;
            }

            // Pairs with the SeqCst publish in `remember`: a pointer unlinked
            // before this point is either seen here or fails `protect`'s re-check.
            fence(Ordering::SeqCst);
            let mut hazards: Vec<*mut T> = self
                .iter()
                .filter(|slot| slot.is_active.load(Ordering::Acquire))
                .map(|slot| slot.data_ptr.load(Ordering::SeqCst))
                .filter(|p| !p.is_null())
                .collect();
            hazards.sort_unstable();

            let (protected, unprotected): (Vec<_>, Vec<_>) = retired
                .drain(..)
                .partition(|r| hazards.binary_search(&r.0.as_ptr()).is_ok());
            *retired = protected;
            trace!(
                freed = unprotected.len(),
                still_protected = retired.len(),
                "hazard reclaim pass"
            );
            unprotected
        };

        let freed = unprotected.len();
        for r in unprotected {
            // SAFETY: retired exactly once, came from `Box::into_raw`, and no
            // active slot protects it, so no reader can reach it any more.
            unsafe { drop(Box::from_raw(r.0.as_ptr())) };
        }
        freed
    }

    /// Number of slots ever allocated.
    pub fn len(&self) -> usize {
        self.slots.load(Ordering::Relaxed)
    }

    /// Returns true if no slot was ever allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots currently claimed.
    pub fn active_count(&self) -> usize {
        self.iter()
            .filter(|slot| slot.is_active.load(Ordering::Acquire))
            .count()
    }

    /// Number of retired pointers not yet freed.
    pub fn retired_count(&self) -> usize {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T> Default for HazardList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for HazardList<T> {
    fn drop(&mut self) {
        // No guard can outlive the list, so nothing is protected any more.
        let retired = self.retired.get_mut().unwrap_or_else(PoisonError::into_inner);
        for r in retired.drain(..) {
            // SAFETY: see `reclaim`.
            unsafe { drop(Box::from_raw(r.0.as_ptr())) };
        }

        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // SAFETY: every slot came from `Box::into_raw` and is freed once.
            let slot = unsafe { Box::from_raw(current) };
            current = slot.next;
        }
    }
}

impl<T> fmt::Debug for HazardList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HazardList")
            .field("slots", &self.len())
            .field("active", &self.active_count())
            .field("retired", &self.retired_count())
            .finish()
    }
}

struct SlotIter<'a, T> {
    current: *mut HazardSlot<T>,
    _list: &'a HazardList<T>,
}

impl<'a, T> Iterator for SlotIter<'a, T> {
    type Item = &'a HazardSlot<T>;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: published slots are never freed while the list is borrowed,
        // and `next` was written before the slot was published with Release.
        let slot = unsafe { self.current.as_ref()? };
        self.current = slot.next;
        Some(slot)
    }
}

/// Exclusive ownership of one hazard slot. Released on drop.
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct HazardGuard<'a, T> {
    slot: &'a HazardSlot<T>,
}

impl<T> HazardGuard<'_, T> {
    /// Publishes `ptr` as in use.
    ///
    /// The store is sequentially consistent so that a following validation
    /// load of the source cannot be reordered before it.
    #[inline]
    pub fn remember(&self, ptr: *const T) {
        self.slot.data_ptr.store(ptr.cast_mut(), Ordering::SeqCst);
    }

    /// Loads `src`, publishes the value and re-checks `src` until both agree.
    ///
    /// Once this returns, the pointer cannot be freed through
    /// [`HazardList::retire`] until the guard is cleared or released.
    pub fn protect(&self, src: &AtomicPtr<T>) -> *mut T {
        let mut ptr = src.load(Ordering::Acquire);
        loop {
            self.remember(ptr);
            let again = src.load(Ordering::SeqCst);
            if again == ptr {
                return ptr;
            }
            ptr = again;
        }
    }

    /// The pointer currently published by this slot.
    #[inline]
    pub fn published(&self) -> *mut T {
        self.slot.data_ptr.load(Ordering::Relaxed)
    }

    /// Stops protecting anything but keeps the slot.
    #[inline]
    pub fn clear(&self) {
        self.slot.data_ptr.store(ptr::null_mut(), Ordering::Release);
    }

    /// Clears the published pointer and hands the slot back for reuse.
    pub fn release(self) {
        drop(self);
    }
}

impl<T> Drop for HazardGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.data_ptr.store(ptr::null_mut(), Ordering::Release);
        self.slot.is_active.store(false, Ordering::Release);
    }
}

impl<T> fmt::Debug for HazardGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HazardGuard")
            .field("published", &self.published())
            .finish()
    }
}
