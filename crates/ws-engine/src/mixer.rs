//! Main playback engine.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{AudioBackend, EngineError};
use crate::clock::{AudioClock, ClockHandle, NoteTrigger};
use crate::frame::Frame;
use crate::transport::TransportClock;
use crate::voice_pool::{TrackGains, VoiceOutput, VoicePool};

/// Renders the transport clock and voice pool into audio frames.
///
/// Each frame first fires the triggers due at the current clock time, then
/// mixes every voice, then advances the clock by one sample.
pub struct Engine {
    clock: TransportClock,
    voices: VoicePool,
    initialized: bool,
}

impl Engine {
    /// Create a new engine at the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            clock: TransportClock::new(sample_rate),
            voices: VoicePool::new(sample_rate),
            initialized: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    /// Generate one frame of audio.
    pub fn render_frame(&mut self) -> Frame {
        let voices = &mut self.voices;
        self.clock.advance_frame(|trigger| voices.trigger(*trigger));
        self.voices.render()
    }

    /// Fill `out` with consecutive frames (allocation-free).
    pub fn render_block(&mut self, out: &mut [Frame]) {
        for frame in out.iter_mut() {
            *frame = self.render_frame();
        }
    }

    /// Render `count` frames into a new buffer.
    pub fn render_frames(&mut self, count: usize) -> Vec<Frame> {
        let mut frames = vec![Frame::silence(); count];
        self.render_block(&mut frames);
        frames
    }

    /// Shared gain table for lock-free volume/mute from other threads.
    pub fn track_gains(&self) -> Arc<TrackGains> {
        self.voices.gains()
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn voices(&self) -> &VoicePool {
        &self.voices
    }
}

impl AudioClock for Engine {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    fn schedule(&mut self, at: f64, trigger: NoteTrigger) -> ClockHandle {
        self.clock.schedule(at, trigger)
    }

    fn schedule_many(&mut self, events: &[(f64, NoteTrigger)]) -> Vec<ClockHandle> {
        self.clock.schedule_many(events)
    }

    fn cancel(&mut self, handle: ClockHandle) -> bool {
        self.clock.cancel(handle)
    }

    fn cancel_many(&mut self, handles: &[ClockHandle]) -> usize {
        self.clock.cancel_many(handles)
    }

    fn start(&mut self, origin: f64) {
        self.clock.start(origin);
    }

    fn pause(&mut self) {
        self.clock.pause();
    }

    fn stop(&mut self) {
        self.clock.stop();
    }
}

impl VoiceOutput for Engine {
    fn allocate(&mut self, track_count: usize, voices_per_track: usize) {
        self.voices.allocate(track_count, voices_per_track);
    }

    fn trigger(&mut self, trigger: NoteTrigger) {
        self.voices.trigger(trigger);
    }

    fn set_volume(&self, track: usize, volume: u8) {
        self.voices.set_volume(track, volume);
    }

    fn set_muted(&self, track: usize, muted: bool) {
        self.voices.set_muted(track, muted);
    }

    fn silence_all(&mut self) {
        self.voices.silence_all();
    }

    fn click(&mut self, accent: bool) {
        self.voices.click(accent);
    }

    fn sounding_count(&self) -> usize {
        self.voices.sounding_count()
    }

    fn steal_count(&self) -> u64 {
        self.voices.steal_count()
    }
}

impl AudioBackend for Engine {
    fn initialize(&mut self) -> Result<(), EngineError> {
        if !self.initialized {
            self.initialized = true;
            debug!(sample_rate = self.sample_rate(), "engine initialized");
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
