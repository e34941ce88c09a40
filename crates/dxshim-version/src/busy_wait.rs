//! Busy-wait mitigation
//!
//! Games that poll `PeekMessage` or `GetTickCount` in a tight loop starve
//! other threads on modern schedulers. Each hooked call checks how many CPU
//! cycles the calling thread has consumed since it last gave up its time
//! slice and yields once the budget is exceeded.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cycle budget used when the config does not set one
pub const DEFAULT_THREAD_SWITCH_CYCLE_TIME: u64 = 1_000_000;

static THRESHOLD: AtomicU64 = AtomicU64::new(DEFAULT_THREAD_SWITCH_CYCLE_TIME);

thread_local! {
    static LAST_SWITCH: Cell<Option<u64>> = const { Cell::new(None) };
}

pub fn set_threshold(cycles: u64) {
    THRESHOLD.store(cycles, Ordering::Relaxed);
}

pub fn threshold() -> u64 {
    THRESHOLD.load(Ordering::Relaxed)
}

/// Per-thread switch bookkeeping
///
/// The first observation only records the baseline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwitchClock {
    last: Option<u64>,
}

impl SwitchClock {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Returns true when the thread should yield now
    pub fn tick(&mut self, now: u64, threshold: u64) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now.wrapping_sub(last) >= threshold => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

/// Check the calling thread against `threshold` and run `yield_now` when
/// its budget is used up. Returns whether it yielded.
pub fn mitigate(threshold: u64, now: u64, yield_now: impl FnOnce()) -> bool {
    let should_yield = LAST_SWITCH.with(|last| {
        let mut clock = SwitchClock { last: last.get() };
        let should_yield = clock.tick(now, threshold);
        last.set(clock.last);
        should_yield
    });
    if should_yield {
        yield_now();
    }
    should_yield
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_sets_baseline() {
        let mut clock = SwitchClock::new();
        assert!(!clock.tick(5_000_000, 1_000));
        assert!(!clock.tick(5_000_500, 1_000));
        assert!(clock.tick(5_001_000, 1_000));
        // Budget restarts from the yield.
        assert!(!clock.tick(5_001_999, 1_000));
        assert!(clock.tick(5_002_000, 1_000));
    }

    #[test]
    fn test_mitigate_yields_per_thread() {
        let mut yields = 0;
        assert!(!mitigate(100, 1_000, || yields += 1));
        assert!(!mitigate(100, 1_050, || yields += 1));
        assert!(mitigate(100, 1_100, || yields += 1));
        assert_eq!(yields, 1);

        // Another thread starts with its own baseline.
        let other = std::thread::spawn(|| mitigate(100, 1_000_000, || {})).join().unwrap();
        assert!(!other);
    }

    #[test]
    fn test_counter_wraparound() {
        let mut clock = SwitchClock::new();
        clock.tick(u64::MAX - 10, 100);
        assert!(!clock.tick(20, 100));
        assert!(clock.tick(90, 100));
    }

    #[test]
    fn test_threshold_roundtrip() {
        set_threshold(DEFAULT_THREAD_SWITCH_CYCLE_TIME);
        assert_eq!(threshold(), DEFAULT_THREAD_SWITCH_CYCLE_TIME);
    }
}
