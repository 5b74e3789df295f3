use std::hint;
use std::thread;
use std::time::Duration;

/// Adaptive backoff for retrying `Busy`/`Full`/`Empty` outcomes.
///
/// Spin with PAUSE hints, then yield to the OS, then sleep in short naps.
/// Bounded retry helpers stop once [`is_completed`](Self::is_completed)
/// reports true; gate waits keep calling [`snooze`](Self::snooze) and settle
/// on the nap.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding
    const YIELD_LIMIT: u32 = 10;
    const NAP: Duration = Duration::from_micros(3);

    /// Creates a new backoff instance.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Light spin with PAUSE hints. Never leaves the CPU.
    #[inline]
    pub fn spin(&mut self) {
        for _ in 0..1u32 << self.step.min(Self::SPIN_LIMIT) {
            hint::spin_loop();
        }
        if self.step <= Self::SPIN_LIMIT {
            self.step += 1;
        }
    }

    /// Spin, then yield, then nap once patience is exhausted.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            self.spin();
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
            self.step += 1;
        } else {
            thread::sleep(Self::NAP);
        }
    }

    /// True once spinning and yielding have both been tried.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }

    /// Reset for next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
