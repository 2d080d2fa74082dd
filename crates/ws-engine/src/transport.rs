//! Sample-counting transport clock.

use crate::clock::{AudioClock, ClockHandle, NoteTrigger};
use crate::event_queue::EventQueue;

/// An [`AudioClock`] advanced one frame at a time by the renderer.
///
/// Time is `origin + frames / sample_rate`, so it never accumulates
/// floating-point drift however long playback runs.
#[derive(Clone, Debug)]
pub struct TransportClock {
    queue: EventQueue,
    sample_rate: u32,
    /// Timeline position at which the frame counter was last reset
    origin: f64,
    /// Frames rendered since `origin`
    frames: u64,
    running: bool,
}

impl TransportClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            queue: EventQueue::new(),
            sample_rate: sample_rate.max(1),
            origin: 0.0,
            frames: 0,
            running: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Timeline position of the last start, pause or stop.
    pub fn origin(&self) -> f64 {
        self.origin
    }

    /// Number of live triggers on the timeline.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether `handle` is still scheduled.
    pub fn is_scheduled(&self, handle: ClockHandle) -> bool {
        self.queue.contains(handle)
    }

    /// Fire every trigger due at the current time, then advance one frame.
    ///
    /// Does nothing while paused or stopped. Allocation-free.
    pub fn advance_frame(&mut self, mut fire: impl FnMut(&NoteTrigger)) {
        if !self.running {
            return;
        }
        let now = self.now();
        for index in self.queue.drain_until(now) {
            if let Some(trigger) = self.queue.get(index) {
                fire(trigger);
            }
        }
        self.frames += 1;
    }

    /// Collapse the frame counter into the origin so `now()` stays exact.
    fn rebase(&mut self) {
        self.origin = self.now();
        self.frames = 0;
    }
}

impl AudioClock for TransportClock {
    fn now(&self) -> f64 {
        self.origin + self.frames as f64 / self.sample_rate as f64
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn schedule(&mut self, at: f64, trigger: NoteTrigger) -> ClockHandle {
        self.queue.push(at, trigger)
    }

    fn schedule_many(&mut self, events: &[(f64, NoteTrigger)]) -> Vec<ClockHandle> {
        let now = self.now();
        self.queue.push_many(events, now)
    }

    fn cancel(&mut self, handle: ClockHandle) -> bool {
        self.queue.cancel(handle)
    }

    fn cancel_many(&mut self, handles: &[ClockHandle]) -> usize {
        let cancelled = handles.iter().filter(|&&h| self.queue.cancel(h)).count();
        self.queue.compact_if_stale();
        cancelled
    }

    fn start(&mut self, origin: f64) {
        self.origin = origin;
        self.frames = 0;
        self.queue.seek(origin);
        self.running = true;
    }

    fn pause(&mut self) {
        self.rebase();
        self.running = false;
    }

    fn stop(&mut self) {
        self.origin = 0.0;
        self.frames = 0;
        self.queue.seek(0.0);
        self.running = false;
    }
}
