//! Result codes and error types for queue operations.
//!
//! `Full`, `Empty` and `Busy` are ordinary flow-control outcomes: they are
//! cheap to produce, never allocate, and the caller is expected to retry.
//! [`QueueError`] covers the hard failures (bad configuration, allocation
//! failure while growing, handle already taken).

use std::collections::TryReserveError;
use thiserror::Error;

/// Outcome code of a queue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation completed.
    Done,
    /// The queue had no free slot.
    Full,
    /// The queue had no element.
    Empty,
    /// Another reader or writer held the gate, or a resize was in progress.
    Busy,
}

/// Hard errors: the queue could not be built or could not make room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A queue needs at least one slot.
    #[error("queue capacity must be non-zero")]
    ZeroCapacity,

    /// Doubling the capacity would overflow `usize`.
    #[error("capacity overflow while growing from {current} slots")]
    CapacityOverflow {
        /// Capacity at the time growth was attempted.
        current: usize,
    },

    /// The allocator refused the slot storage.
    #[error("failed to allocate storage for {requested} slots")]
    Allocation {
        /// Number of slots requested.
        requested: usize,
        /// Underlying allocator error.
        #[source]
        source: TryReserveError,
    },

    /// The queue is single-writer and its writer handle is still alive.
    #[error("writer handle already taken (queue is not multi-writer)")]
    WriterTaken,

    /// The queue is single-reader and its reader handle is still alive.
    #[error("reader handle already taken (queue is not multi-reader)")]
    ReaderTaken,
}

/// Rejected enqueue. The value is handed back so it is never lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError<T> {
    /// No free slot (fixed-capacity queues only).
    #[error("queue is full")]
    Full(T),

    /// Another writer holds the writer gate.
    #[error("writer gate is busy")]
    Busy(T),

    /// A growable queue was full and could not grow. The queue is unchanged.
    #[error("queue could not grow: {source}")]
    Grow {
        /// The value that was being enqueued.
        value: T,
        /// Why growth failed.
        #[source]
        source: QueueError,
    },
}

impl<T> EnqueueError<T> {
    /// Returns the value that could not be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Busy(value) | Self::Grow { value, .. } => value,
        }
    }

    /// Maps the error onto a result code. A failed growth reports `Full`:
    /// the queue could not make room for the value.
    pub fn status(&self) -> Status {
        match self {
            Self::Full(_) | Self::Grow { .. } => Status::Full,
            Self::Busy(_) => Status::Busy,
        }
    }

    /// Returns `true` if retrying the same call may succeed.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full(_) | Self::Busy(_))
    }

    /// Returns `true` for hard failures that retrying will not fix.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Grow { .. })
    }
}

/// Rejected dequeue or peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DequeueError {
    /// No element was available.
    #[error("queue is empty")]
    Empty,

    /// Another reader holds the reader gate, or the queue is resizing.
    #[error("reader gate is busy")]
    Busy,
}

impl DequeueError {
    /// Maps the error onto a result code.
    pub fn status(self) -> Status {
        match self {
            Self::Empty => Status::Empty,
            Self::Busy => Status::Busy,
        }
    }
}

impl<T> From<&Result<(), EnqueueError<T>>> for Status {
    fn from(result: &Result<(), EnqueueError<T>>) -> Self {
        match result {
            Ok(()) => Status::Done,
            Err(err) => err.status(),
        }
    }
}

impl<T> From<&Result<T, DequeueError>> for Status {
    fn from(result: &Result<T, DequeueError>) -> Self {
        match result {
            Ok(_) => Status::Done,
            Err(err) => err.status(),
        }
    }
}
