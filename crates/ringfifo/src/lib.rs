//! RingFIFO - Array-Backed Lock-Free FIFO Queue
//!
//! A fixed-capacity ring buffer for producer/consumer pipelines, with
//! optional multi-reader / multi-writer gates and an optional growable mode,
//! plus a hazard-pointer list for deferred reclamation of shared memory.
//!
//! # Key Features
//!
//! - Unwrapped `u64` cursors: no wasted slot, no full/empty ambiguity
//! - Release/Acquire cursor protocol, no locks on the SPSC path
//! - One try-lock gate per side in multi-reader / multi-writer mode
//! - Growable mode doubles storage under an explicit exclusive resize token
//! - Non-blocking operations: `Full`, `Empty` and `Busy` are results, not waits
//!
//! # Example
//!
//! ```
//! use ringfifo_rs::{Config, DequeueError, Queue, Status};
//!
//! let queue = Queue::<u64>::new(Config::new(4).with_growable(true)).unwrap();
//! let mut writer = queue.writer().unwrap();
//! let mut reader = queue.reader().unwrap();
//!
//! for i in 0..5 {
//!     writer.enqueue(i).unwrap(); // the fifth value doubles the storage
//! }
//! assert_eq!(queue.capacity(), 8);
//!
//! let outcome = reader.dequeue();
//! assert_eq!(Status::from(&outcome), Status::Done);
//! assert_eq!(outcome, Ok(0));
//!
//! let mut rest = Vec::new();
//! reader.drain_into(&mut rest, usize::MAX).unwrap();
//! assert_eq!(rest, vec![1, 2, 3, 4]);
//! assert_eq!(reader.dequeue(), Err(DequeueError::Empty));
//! ```

mod backoff;
mod config;
mod error;
mod gate;
pub mod hazard;
mod invariants;
mod metrics;
mod queue;
mod storage;
mod trace;

pub use backoff::Backoff;
pub use config::{Config, MPMC_CONFIG, SPSC_CONFIG};
pub use error::{DequeueError, EnqueueError, QueueError, Status};
pub use hazard::{HazardGuard, HazardList};
pub use metrics::MetricsSnapshot;
pub use queue::{Queue, Reader, Writer};
pub use trace::init_tracing;
