//! Audio clock contract.
//!
//! The clock is the single source of elapsed playback time. Note triggers are
//! registered at absolute positions on its timeline and fire whenever the
//! running clock passes over them, so repositioning the origin backwards
//! replays them.

slotmap::new_key_type! {
    /// Handle to one scheduled trigger, used to cancel it.
    pub struct ClockHandle;
}

/// Instruction to sound one note on a track's voices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteTrigger {
    pub track: usize,
    pub pitch: u8,
    pub velocity: f32,
    /// How long the note is held, in clock seconds
    pub duration_seconds: f64,
}

/// A schedulable, pausable, monotonic clock.
///
/// All times are clock seconds on the transport timeline.
pub trait AudioClock {
    /// Current timeline position.
    fn now(&self) -> f64;

    /// Whether the clock is advancing.
    fn is_running(&self) -> bool;

    /// Register a trigger at `at`.
    fn schedule(&mut self, at: f64, trigger: NoteTrigger) -> ClockHandle;

    /// Register many triggers as one operation.
    fn schedule_many(&mut self, events: &[(f64, NoteTrigger)]) -> Vec<ClockHandle> {
        events
            .iter()
            .map(|&(at, trigger)| self.schedule(at, trigger))
            .collect()
    }

    /// Remove a trigger. Returns false if it was already cancelled.
    fn cancel(&mut self, handle: ClockHandle) -> bool;

    /// Remove many triggers as one operation. Returns how many were live.
    fn cancel_many(&mut self, handles: &[ClockHandle]) -> usize {
        handles.iter().filter(|&&h| self.cancel(h)).count()
    }

    /// Move the timeline to `origin` and start advancing.
    fn start(&mut self, origin: f64);

    /// Halt advancement, keeping the position and all triggers.
    fn pause(&mut self);

    /// Halt advancement and rewind to zero.
    fn stop(&mut self);
}
