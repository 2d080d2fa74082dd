//! Wall-clock time sources.
//!
//! Count-in pre-roll and the active-note throttle run on wall time, never on
//! the session's audio clock, which stays halted during a count-in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic seconds since an arbitrary epoch.
pub trait WallClock {
    fn seconds(&self) -> f64;
}

/// Real time, measured from construction.
#[derive(Clone, Copy, Debug)]
pub struct SystemWallClock {
    epoch: Instant,
}

impl SystemWallClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemWallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemWallClock {
    fn seconds(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Manually advanced time, for offline rendering and tests.
///
/// Clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct ManualWallClock {
    nanos: Arc<AtomicU64>,
}

impl ManualWallClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        let nanos = (seconds.max(0.0) * 1e9).round() as u64;
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

impl WallClock for ManualWallClock {
    fn seconds(&self) -> f64 {
        self.nanos.load(Ordering::Relaxed) as f64 / 1e9
    }
}
