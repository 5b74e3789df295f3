use crate::QueueError;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

/// One slot of the ring. Initialization is tracked by the queue cursors,
/// not by the slot itself.
#[repr(transparent)]
struct Slot<T>(UnsafeCell<MaybeUninit<T>>);

impl<T> Slot<T> {
    const fn empty() -> Self {
        Self(UnsafeCell::new(MaybeUninit::uninit()))
    }
}

/// Fixed-length slot array owned by a queue.
///
/// Backed by `Box<[_]>` rather than `Vec<_>`: the length never changes after
/// allocation. A growable queue swaps in a whole new `Storage` instead.
/// Indexing is bounds-checked.
pub(crate) struct Storage<T> {
    slots: Box<[Slot<T>]>,
}

impl<T> Storage<T> {
    /// Allocates `len` uninitialized slots, reporting allocator failure
    /// instead of aborting.
    pub(crate) fn try_new(len: usize) -> Result<Self, QueueError> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|source| QueueError::Allocation {
                requested: len,
                source,
            })?;
        slots.resize_with(len, Slot::empty);
        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Writes `value` into slot `idx`.
    ///
    /// # Safety
    ///
    /// The slot must be logically empty (outside `[read, write)`) and no
    /// other thread may access it concurrently. The previous content, if
    /// any, is overwritten without being dropped.
    #[inline]
    pub(crate) unsafe fn write(&self, idx: usize, value: T) {
        (*self.slots[idx].0.get()).write(value);
    }

    /// Moves the value out of slot `idx`, leaving it logically empty.
    ///
    /// # Safety
    ///
    /// The slot must be initialized (inside `[read, write)`), no other thread
    /// may access it concurrently, and the caller must advance past it so it
    /// is never read again.
    #[inline]
    pub(crate) unsafe fn take(&self, idx: usize) -> T {
        (*self.slots[idx].0.get()).assume_init_read()
    }

    /// Borrows the value in slot `idx`.
    ///
    /// # Safety
    ///
    /// The slot must be initialized and must not be written or taken while
    /// the reference lives.
    #[inline]
    pub(crate) unsafe fn get(&self, idx: usize) -> &T {
        (*self.slots[idx].0.get()).assume_init_ref()
    }

    /// Drops the value in slot `idx` in place.
    ///
    /// # Safety
    ///
    /// Same as [`take`](Self::take).
    #[inline]
    pub(crate) unsafe fn drop_in_place(&mut self, idx: usize) {
        self.slots[idx].0.get_mut().assume_init_drop();
    }
}
