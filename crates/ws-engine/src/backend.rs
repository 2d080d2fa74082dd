//! The combined clock + voice contract a playback session runs against.

use thiserror::Error;

use crate::clock::{AudioClock, ClockHandle, NoteTrigger};
use crate::voice_pool::VoiceOutput;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("audio clock unavailable: {0}")]
    ClockUnavailable(String),
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// An audio clock and voice pool that must be initialized before use.
///
/// `initialize` is idempotent: calling it on an initialized backend is a no-op.
pub trait AudioBackend: AudioClock + VoiceOutput {
    fn initialize(&mut self) -> Result<(), EngineError>;

    fn is_initialized(&self) -> bool;

    /// Cancel `stale`, silence every voice, register `events` and start the
    /// clock at `origin`.
    ///
    /// Nothing may render between the cancel and the restart. Backends shared
    /// with a render thread override this to do all of it under one lock.
    fn reschedule(
        &mut self,
        stale: &[ClockHandle],
        events: &[(f64, NoteTrigger)],
        origin: f64,
    ) -> Vec<ClockHandle> {
        self.cancel_many(stale);
        self.silence_all();
        let handles = self.schedule_many(events);
        self.start(origin);
        handles
    }
}
