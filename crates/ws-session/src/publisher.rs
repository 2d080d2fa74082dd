//! Clock publisher: the per-display-frame sampling step.
//!
//! Reads the audio clock, converts it to a musical position, keeps the set of
//! sounding notes up to date and classifies what the session must do next.
//! It never keeps time itself.

use serde::Serialize;
use ws_engine::AudioClock;
use ws_ir::{clock_to_musical, Score, TrackSet};

use crate::loop_region::LoopRegion;

/// Token for one period of the frame task.
///
/// A new token is issued on every transition into playing; any older token is
/// stale and its samples are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTask {
    generation: u64,
}

/// A note sounding at the published position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ActiveNote {
    pub track: usize,
    pub pitch: u8,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// What a sampled position calls for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSignal {
    Continue,
    LoopWrap,
    ScoreEnd,
}

pub fn classify(position: f64, loop_region: &LoopRegion, duration: f64) -> FrameSignal {
    if loop_region.should_wrap(position) {
        FrameSignal::LoopWrap
    } else if !loop_region.is_active() && position >= duration {
        FrameSignal::ScoreEnd
    } else {
        FrameSignal::Continue
    }
}

#[derive(Debug)]
pub struct ClockPublisher {
    generation: u64,
    running: bool,
    /// Minimum wall seconds between active-note scans
    scan_interval: f64,
    last_scan: Option<f64>,
    active: Vec<ActiveNote>,
}

impl ClockPublisher {
    pub fn new(scan_interval: f64) -> Self {
        Self {
            generation: 0,
            running: false,
            scan_interval,
            last_scan: None,
            active: Vec::new(),
        }
    }

    /// Start a new frame task, invalidating every earlier one.
    pub fn begin(&mut self) -> FrameTask {
        self.generation += 1;
        self.running = true;
        self.last_scan = None;
        FrameTask {
            generation: self.generation,
        }
    }

    /// Cancel the running frame task.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.running = false;
    }

    pub fn current(&self) -> Option<FrameTask> {
        self.running.then_some(FrameTask {
            generation: self.generation,
        })
    }

    pub fn is_current(&self, task: FrameTask) -> bool {
        self.running && task.generation == self.generation
    }

    /// Force the next refresh to rescan regardless of the throttle.
    pub fn invalidate_scan(&mut self) {
        self.last_scan = None;
    }

    /// Musical position implied by the clock.
    pub fn sample<C: AudioClock + ?Sized>(&self, clock: &C, speed: f64) -> f64 {
        clock_to_musical(clock.now(), speed)
    }

    /// Rescan sounding notes on unmuted tracks if the throttle allows.
    ///
    /// Returns the new set only when a scan ran and the set changed.
    pub fn refresh(
        &mut self,
        score: &Score,
        position: f64,
        muted: &TrackSet,
        now: f64,
    ) -> Option<&[ActiveNote]> {
        if self
            .last_scan
            .is_some_and(|last| now - last < self.scan_interval)
        {
            return None;
        }
        self.last_scan = Some(now);

        let fresh: Vec<ActiveNote> = score
            .tracks()
            .iter()
            .filter(|track| !muted.contains(&track.index()))
            .flat_map(|track| {
                track.sounding_at(position).map(move |note| ActiveNote {
                    track: track.index(),
                    pitch: note.pitch,
                    start_seconds: note.start_seconds,
                    end_seconds: note.end_seconds(),
                })
            })
            .collect();

        if fresh == self.active {
            return None;
        }
        self.active = fresh;
        Some(&self.active)
    }

    pub fn active_notes(&self) -> &[ActiveNote] {
        &self.active
    }

    /// Drop all active notes. Returns true if there were any.
    pub fn clear_active(&mut self) -> bool {
        let had = !self.active.is_empty();
        self.active.clear();
        had
    }
}
