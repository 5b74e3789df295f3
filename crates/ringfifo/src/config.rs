use crate::QueueError;

/// Configuration for a [`Queue`](crate::Queue).
///
/// The three mode flags select the synchronization policy at construction:
///
/// | flag           | effect                                                     |
/// |----------------|------------------------------------------------------------|
/// | `multi_reader` | readers serialize through a try-lock gate (`Busy` on loss) |
/// | `multi_writer` | writers serialize through a try-lock gate (`Busy` on loss) |
/// | `growable`     | a full queue doubles its storage instead of reporting full |
///
/// With every flag off the queue is a plain SPSC ring and cursors are the
/// only synchronization signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of usable slots (initial capacity for growable queues).
    pub capacity: usize,
    /// Allow more than one concurrent `Reader`.
    pub multi_reader: bool,
    /// Allow more than one concurrent `Writer`.
    pub multi_writer: bool,
    /// Double the storage on demand instead of returning `Full`.
    pub growable: bool,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a single-producer single-consumer configuration.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            multi_reader: false,
            multi_writer: false,
            growable: false,
            enable_metrics: false,
        }
    }

    /// Sets whether multiple readers may operate concurrently.
    pub const fn with_multi_reader(mut self, enabled: bool) -> Self {
        self.multi_reader = enabled;
        self
    }

    /// Sets whether multiple writers may operate concurrently.
    pub const fn with_multi_writer(mut self, enabled: bool) -> Self {
        self.multi_writer = enabled;
        self
    }

    /// Sets whether the queue grows when full.
    pub const fn with_growable(mut self, enabled: bool) -> Self {
        self.growable = enabled;
        self
    }

    /// Sets whether operation counters are collected.
    pub const fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Checks the configuration before any storage is allocated.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Plain SPSC queue with 4K slots
pub const SPSC_CONFIG: Config = Config::new(4096);

/// Gated multi-reader/multi-writer queue with 4K slots
pub const MPMC_CONFIG: Config = Config::new(4096)
    .with_multi_reader(true)
    .with_multi_writer(true);
