use crate::gate::{Gate, ResizeGate};
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_initialized_read, debug_assert_monotonic,
    debug_assert_read_not_past_write, debug_assert_resize_preserves,
};
use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::trace::{debug, warn};
use crate::{Backoff, Config, DequeueError, EnqueueError, MetricsSnapshot, QueueError};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// ## Unwrapped Cursors
//
// `read` and `write` are u64 counters that only grow (a resize rebases both,
// see below). `write - read` is the number of live elements, `read == write`
// means empty and `write - read == capacity` means full. No slot is wasted
// and there is no full/empty ambiguity. Slot index is `cursor % capacity`.
//
// ## Memory Ordering Protocol
//
// **Writer:**
// 1. Load `write` with Relaxed (writers are serialized, see gates)
// 2. Load `read` with Acquire (the reader finished moving the slot out)
// 3. Write the value into `storage[write % capacity]`
// 4. Store `write + 1` with Release (publishes the slot to readers)
//
// **Reader:**
// 1. Load `read` with Relaxed (readers are serialized, see gates)
// 2. Load `write` with Acquire (synchronizes with step 4 above)
// 3. Move the value out of `storage[read % capacity]`
// 4. Store `read + 1` with Release (hands the slot back to writers)
//
// ## Serialization
//
// - Single writer / single reader: enforced by the handle model. At most one
//   `Writer` (resp. `Reader`) exists and its operations take `&mut self`.
// - Multi writer / multi reader: a `Gate` try-lock per side. Losing the CAS
//   reports `Busy`. The gate's Acquire/Release pair orders cursor updates
//   between successive holders.
//
// ## Growth
//
// A growable queue that is full allocates storage of twice the capacity
// *before* touching any shared state, then takes the `ResizeGate`
// exclusively. Readers inside the storage are waited out; new readers get
// `Busy` until the resize ends. Live elements move to the front of the new
// storage, `read` becomes 0 and `write` becomes the element count. Writers
// never race the resize: the resizer *is* the (serialized) writer.
//
// =============================================================================

#[inline]
fn slot_index(cursor: u64, capacity: usize) -> usize {
    (cursor % capacity as u64) as usize
}

struct Shared<T> {
    // === WRITER HOT ===
    write: CachePadded<AtomicU64>,
    writing: CachePadded<Gate>,

    // === READER HOT ===
    read: CachePadded<AtomicU64>,
    reading: CachePadded<Gate>,
    resize: CachePadded<ResizeGate>,

    // === COLD STATE ===
    /// Usable slots; only changes under exclusive `resize` access.
    capacity: AtomicUsize,
    /// Single-writer mode: a `Writer` handle is alive.
    writer_taken: AtomicBool,
    /// Single-reader mode: a `Reader` handle is alive.
    reader_taken: AtomicBool,
    metrics: Metrics,
    config: Config,

    storage: UnsafeCell<Storage<T>>,
}

// Safety: every access to `storage` is ordered by the cursor protocol and the
// gates described above. Values cross threads by move, so `T: Send` suffices.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn counters(&self) -> Option<&Metrics> {
        self.config.enable_metrics.then_some(&self.metrics)
    }

    #[inline]
    fn note_busy(&self) {
        if let Some(m) = self.counters() {
            m.record_busy();
        }
    }

    /// Appends one value. Caller must be the only active writer.
    fn push(&self, value: T) -> Result<(), EnqueueError<T>> {
        loop {
            let write = self.write.load(Ordering::Relaxed);
            let read = self.read.load(Ordering::Acquire);
            let capacity = self.capacity.load(Ordering::Relaxed);
            let count = write.wrapping_sub(read) as usize;

            debug_assert_bounded_count!(count, capacity);

            if count < capacity {
                // SAFETY: slot `write` is outside [read, write) so no reader
                // touches it, and this is the only writer. Storage cannot be
                // swapped underneath us because only the writer resizes.
                unsafe {
                    (*self.storage.get()).write(slot_index(write, capacity), value);
                }
                let new_write = write + 1;
                debug_assert_monotonic!("write", write, new_write);
                self.write.store(new_write, Ordering::Release);

                if let Some(m) = self.counters() {
                    m.record_enqueue();
                }
                return Ok(());
            }

            if !self.config.growable {
                if let Some(m) = self.counters() {
                    m.record_full();
                }
                return Err(EnqueueError::Full(value));
            }

            if let Err(source) = self.grow(capacity) {
                warn!(capacity, error = %source, "queue growth failed");
                return Err(EnqueueError::Grow { value, source });
            }
        }
    }

    /// Doubles the storage. Caller must be the only active writer.
    #[cold]
    fn grow(&self, current: usize) -> Result<(), QueueError> {
        let new_capacity = current
            .checked_mul(2)
            .ok_or(QueueError::CapacityOverflow { current })?;

        // Nothing shared is touched before this succeeds, so an allocation
        // failure leaves the queue in its pre-resize state.
        let fresh = Storage::try_new(new_capacity)?;
        debug!(from = current, to = new_capacity, "growing queue");

        let _exclusive = self.resize.lock_exclusive();

        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Relaxed);
        let count = write.wrapping_sub(read) as usize;

        // SAFETY: readers are locked out by `_exclusive` and the caller is the
        // only writer, so nothing else can observe the storage right now.
        let storage = unsafe { &mut *self.storage.get() };
        debug_assert_eq!(storage.len(), current);

        let mut moved = 0;
        for pos in read..write {
            // SAFETY: `pos` is in the live range of the old storage and each
            // fresh slot below `count` is written exactly once.
            unsafe {
                fresh.write(moved, storage.take(slot_index(pos, current)));
            }
            moved += 1;
        }
        debug_assert_resize_preserves!(moved, count, current, new_capacity);

        // Old slots are `MaybeUninit`; dropping them drops no `T`.
        *storage = fresh;
        self.read.store(0, Ordering::Release);
        self.write.store(count as u64, Ordering::Release);
        self.capacity.store(new_capacity, Ordering::Release);

        if let Some(m) = self.counters() {
            m.record_resize();
        }
        debug!(capacity = new_capacity, len = count, "queue grown");
        Ok(())
    }

    /// Removes the front value. Caller must be the only active reader and,
    /// for growable queues, hold shared resize access.
    fn pop(&self) -> Result<T, DequeueError> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);

        if read == write {
            if let Some(m) = self.counters() {
                m.record_empty();
            }
            return Err(DequeueError::Empty);
        }

        debug_assert_initialized_read!(read, read, write);
        let capacity = self.capacity.load(Ordering::Acquire);

        // SAFETY: `read` is in [read, write) so the slot holds a value that
        // was published by the writer's Release store, observed above with
        // Acquire. The writer will not reuse it until `read` advances.
        let value = unsafe { (*self.storage.get()).take(slot_index(read, capacity)) };

        let new_read = read + 1;
        debug_assert_read_not_past_write!(new_read, write);
        debug_assert_monotonic!("read", read, new_read);
        self.read.store(new_read, Ordering::Release);

        if let Some(m) = self.counters() {
            m.record_dequeue(1);
        }
        Ok(value)
    }

    /// Clones the front value without consuming it. Same requirements as `pop`.
    fn peek(&self) -> Result<T, DequeueError>
    where
        T: Clone,
    {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);

        if read == write {
            if let Some(m) = self.counters() {
                m.record_empty();
            }
            return Err(DequeueError::Empty);
        }

        let capacity = self.capacity.load(Ordering::Acquire);
        // SAFETY: as in `pop`; the value stays in place and `read` is not
        // advanced, so the writer cannot overwrite it during the clone.
        let value = unsafe { (*self.storage.get()).get(slot_index(read, capacity)).clone() };
        Ok(value)
    }

    /// Moves up to `max` values out with a single cursor update. Same
    /// requirements as `pop`.
    fn take_batch(&self, max: usize) -> Result<Vec<T>, DequeueError> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);

        let avail = write.wrapping_sub(read) as usize;
        if avail == 0 {
            if let Some(m) = self.counters() {
                m.record_empty();
            }
            return Err(DequeueError::Empty);
        }

        let to_take = avail.min(max);
        let capacity = self.capacity.load(Ordering::Acquire);
        // SAFETY: see `pop`; every slot in [read, read + to_take) is live.
        let storage = unsafe { &*self.storage.get() };

        let mut batch = Vec::with_capacity(to_take);
        for pos in read..read + to_take as u64 {
            debug_assert_initialized_read!(pos, read, write);
            // SAFETY: `pos` is live and the cursor moves past it below.
            batch.push(unsafe { storage.take(slot_index(pos, capacity)) });
        }

        let new_read = read + to_take as u64;
        debug_assert_read_not_past_write!(new_read, write);
        debug_assert_monotonic!("read", read, new_read);
        self.read.store(new_read, Ordering::Release);

        if let Some(m) = self.counters() {
            m.record_dequeue(to_take as u64);
        }
        Ok(batch)
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let read = *self.read.get_mut();
        let write = *self.write.get_mut();
        let capacity = *self.capacity.get_mut();
        let storage = self.storage.get_mut();

        for pos in read..write {
            // SAFETY: exclusive access; [read, write) are exactly the live slots.
            unsafe { storage.drop_in_place(slot_index(pos, capacity)) };
        }
    }
}

/// Array-backed FIFO queue.
///
/// `Queue` is a cheap, cloneable handle to shared state; it exposes the
/// read-only views (`size`, `capacity`, ...). Elements go in through a
/// [`Writer`] and come out through a [`Reader`]:
///
/// ```
/// use ringfifo_rs::{Config, DequeueError, EnqueueError, Queue};
///
/// let queue = Queue::<u32>::new(Config::new(2)).unwrap();
/// let mut writer = queue.writer().unwrap();
/// let mut reader = queue.reader().unwrap();
///
/// writer.enqueue(1).unwrap();
/// writer.enqueue(2).unwrap();
/// assert_eq!(writer.enqueue(3), Err(EnqueueError::Full(3)));
///
/// assert_eq!(reader.peek(), Ok(1));
/// assert_eq!(reader.dequeue(), Ok(1));
/// assert_eq!(reader.dequeue(), Ok(2));
/// assert_eq!(reader.dequeue(), Err(DequeueError::Empty));
/// ```
pub struct Queue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Queue<T> {
    /// Creates a queue with the given configuration.
    pub fn new(config: Config) -> Result<Self, QueueError> {
        config.validate()?;
        let storage = Storage::try_new(config.capacity)?;

        debug!(
            capacity = config.capacity,
            multi_reader = config.multi_reader,
            multi_writer = config.multi_writer,
            growable = config.growable,
            "queue created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                write: CachePadded::new(AtomicU64::new(0)),
                writing: CachePadded::new(Gate::new()),
                read: CachePadded::new(AtomicU64::new(0)),
                reading: CachePadded::new(Gate::new()),
                resize: CachePadded::new(ResizeGate::new()),
                capacity: AtomicUsize::new(config.capacity),
                writer_taken: AtomicBool::new(false),
                reader_taken: AtomicBool::new(false),
                metrics: Metrics::new(),
                config,
                storage: UnsafeCell::new(storage),
            }),
        })
    }

    /// Creates a fixed-capacity SPSC queue.
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        Self::new(Config::new(capacity))
    }

    /// Returns a producer handle.
    ///
    /// Unless the queue is multi-writer, only one `Writer` may exist at a
    /// time; dropping it makes the slot available again.
    pub fn writer(&self) -> Result<Writer<T>, QueueError> {
        if !self.shared.config.multi_writer && self.shared.writer_taken.swap(true, Ordering::AcqRel) {
            return Err(QueueError::WriterTaken);
        }
        Ok(Writer { queue: self.clone() })
    }

    /// Returns a consumer handle.
    ///
    /// Unless the queue is multi-reader, only one `Reader` may exist at a
    /// time; dropping it makes the slot available again.
    pub fn reader(&self) -> Result<Reader<T>, QueueError> {
        if !self.shared.config.multi_reader && self.shared.reader_taken.swap(true, Ordering::AcqRel) {
            return Err(QueueError::ReaderTaken);
        }
        Ok(Reader { queue: self.clone() })
    }

    /// Number of elements currently enqueued.
    ///
    /// A snapshot: under concurrent use it may be stale by the time it returns.
    #[inline]
    pub fn size(&self) -> usize {
        let read = self.shared.read.load(Ordering::Acquire);
        let write = self.shared.write.load(Ordering::Acquire);
        (write.saturating_sub(read) as usize).min(self.capacity())
    }

    /// Number of usable slots. Grows over time for growable queues.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity.load(Ordering::Acquire)
    }

    /// Returns true if the queue holds no element.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns true if every slot is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity()
    }

    /// The configuration the queue was built with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Get a snapshot of metrics if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared
            .counters()
            .map(Metrics::snapshot)
            .unwrap_or_default()
    }
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Producer handle. Obtained from [`Queue::writer`].
pub struct Writer<T> {
    queue: Queue<T>,
}

impl<T> Writer<T> {
    /// Appends `value` to the back of the queue.
    ///
    /// Never blocks except while a growable queue doubles its storage.
    /// On `Full` or `Busy` the value is handed back inside the error.
    pub fn enqueue(&mut self, value: T) -> Result<(), EnqueueError<T>> {
        let shared = &*self.queue.shared;

        let _gate = if shared.config.multi_writer {
            if let Some(gate) = shared.writing.try_lock() {
                Some(gate)
            } else {
                shared.note_busy();
                return Err(EnqueueError::Busy(value));
            }
        } else {
            None
        };

        shared.push(value)
    }

    /// Retries `enqueue` with adaptive backoff until it succeeds, fails
    /// terminally, or patience runs out (then the last error is returned).
    pub fn enqueue_with_backoff(&mut self, value: T) -> Result<(), EnqueueError<T>> {
        let mut backoff = Backoff::new();
        let mut value = value;
        loop {
            match self.enqueue(value) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_terminal() || backoff.is_completed() => return Err(err),
                Err(err) => {
                    value = err.into_inner();
                    backoff.snooze();
                }
            }
        }
    }

    /// The queue this handle writes to.
    pub fn queue(&self) -> &Queue<T> {
        &self.queue
    }

    /// Number of elements currently enqueued.
    #[inline]
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    /// Number of usable slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Returns true if the queue holds no element.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns true if every slot is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Metrics snapshot of the underlying queue.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.queue.metrics()
    }
}

impl<T> Drop for Writer<T> {
    fn drop(&mut self) {
        let shared = &self.queue.shared;
        if !shared.config.multi_writer {
            shared.writer_taken.store(false, Ordering::Release);
        }
    }
}

impl<T> fmt::Debug for Writer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer").field("queue", &self.queue).finish()
    }
}

/// Consumer handle. Obtained from [`Queue::reader`].
pub struct Reader<T> {
    queue: Queue<T>,
}

impl<T> Reader<T> {
    /// Takes the reader gate (multi-reader) and shared resize access
    /// (growable), then runs `op`.
    #[inline]
    fn with_access<R>(
        &self,
        op: impl FnOnce(&Shared<T>) -> Result<R, DequeueError>,
    ) -> Result<R, DequeueError> {
        let shared = &*self.queue.shared;

        let _gate = if shared.config.multi_reader {
            if let Some(gate) = shared.reading.try_lock() {
                Some(gate)
            } else {
                shared.note_busy();
                return Err(DequeueError::Busy);
            }
        } else {
            None
        };

        let _access = if shared.config.growable {
            if let Some(access) = shared.resize.try_share() {
                Some(access)
            } else {
                shared.note_busy();
                return Err(DequeueError::Busy);
            }
        } else {
            None
        };

        op(shared)
    }

    /// Removes and returns the front element.
    pub fn dequeue(&mut self) -> Result<T, DequeueError> {
        self.with_access(Shared::pop)
    }

    /// Returns a clone of the front element without removing it.
    pub fn peek(&mut self) -> Result<T, DequeueError>
    where
        T: Clone,
    {
        self.with_access(Shared::peek)
    }

    /// Moves up to `max_items` elements into `handler`, oldest first, with a
    /// single read-cursor update. Returns how many were consumed.
    ///
    /// The elements leave the queue and every gate is released before
    /// `handler` first runs, so the handler may use the same queue (for
    /// example enqueue into it). If `handler` panics, the elements of the
    /// batch it has not seen yet are dropped.
    pub fn consume_up_to<F>(&mut self, max_items: usize, handler: F) -> Result<usize, DequeueError>
    where
        F: FnMut(T),
    {
        if max_items == 0 {
            return Ok(0);
        }
        let batch = self.with_access(|shared| shared.take_batch(max_items))?;
        let taken = batch.len();
        batch.into_iter().for_each(handler);
        Ok(taken)
    }

    /// Appends up to `max_items` elements to `out`.
    pub fn drain_into(&mut self, out: &mut Vec<T>, max_items: usize) -> Result<usize, DequeueError> {
        if max_items == 0 {
            return Ok(0);
        }
        let mut batch = self.with_access(|shared| shared.take_batch(max_items))?;
        let taken = batch.len();
        out.append(&mut batch);
        Ok(taken)
    }

    /// Retries `dequeue` with adaptive backoff until it succeeds or patience
    /// runs out (then the last error is returned).
    pub fn dequeue_with_backoff(&mut self) -> Result<T, DequeueError> {
        let mut backoff = Backoff::new();
        loop {
            match self.dequeue() {
                Ok(value) => return Ok(value),
                Err(err) if backoff.is_completed() => return Err(err),
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// The queue this handle reads from.
    pub fn queue(&self) -> &Queue<T> {
        &self.queue
    }

    /// Number of elements currently enqueued.
    #[inline]
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    /// Number of usable slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Returns true if the queue holds no element.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns true if every slot is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Metrics snapshot of the underlying queue.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.queue.metrics()
    }
}

impl<T> Drop for Reader<T> {
    fn drop(&mut self) {
        let shared = &self.queue.shared;
        if !shared.config.multi_reader {
            shared.reader_taken.store(false, Ordering::Release);
        }
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").field("queue", &self.queue).finish()
    }
}
