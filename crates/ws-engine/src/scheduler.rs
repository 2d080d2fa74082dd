//! Score-to-trigger scheduling.
//!
//! Walks a score's tracks and produces one clock trigger per audible note,
//! scaled by playback speed. The score itself is never modified, so the same
//! score can be rescheduled at any speed.

use tracing::debug;
use ws_ir::{musical_to_clock, Score, TrackSet};

use crate::backend::AudioBackend;
use crate::clock::{AudioClock, ClockHandle, NoteTrigger};
use crate::voice::RELEASE_SECONDS;
use crate::voice_pool::{VoiceOutput, MAX_VOICES_PER_TRACK};

/// Shortest hold time a trigger may have, in clock seconds.
pub const MIN_AUDIBLE_DURATION: f64 = 0.05;

/// Build `(clock_time, trigger)` pairs for every note on an unmuted track.
///
/// Notes are placed at `start / speed` and held for
/// `max(min_audible, duration / speed)`.
pub fn schedule_score(
    score: &Score,
    speed: f64,
    muted: &TrackSet,
    min_audible: f64,
) -> Vec<(f64, NoteTrigger)> {
    score
        .tracks()
        .iter()
        .filter(|track| !muted.contains(&track.index()))
        .flat_map(|track| {
            track.notes().iter().map(move |note| {
                let trigger = NoteTrigger {
                    track: track.index(),
                    pitch: note.pitch,
                    velocity: note.velocity,
                    duration_seconds: musical_to_clock(note.duration_seconds, speed).max(min_audible),
                };
                (musical_to_clock(note.start_seconds, speed), trigger)
            })
        })
        .collect()
}

/// The set of clock triggers registered for one transition into playback.
///
/// Cancelled as a unit. Cancelling twice is a no-op.
#[derive(Debug)]
pub struct ScheduledBatch {
    handles: Vec<ClockHandle>,
    speed: f64,
    muted: TrackSet,
    live: bool,
}

impl ScheduledBatch {
    /// Schedule every audible note of `score` on `clock`.
    pub fn schedule<C: AudioClock + ?Sized>(
        clock: &mut C,
        score: &Score,
        speed: f64,
        muted: &TrackSet,
        min_audible: f64,
    ) -> Self {
        let events = schedule_score(score, speed, muted, min_audible);
        let handles = clock.schedule_many(&events);
        debug!(triggers = handles.len(), speed, "batch scheduled");
        Self {
            handles,
            speed,
            muted: muted.clone(),
            live: true,
        }
    }

    /// Build a batch for `score` in place of `previous` and start the clock
    /// at `origin`, all in one [`AudioBackend::reschedule`] call.
    pub fn replace<B: AudioBackend + ?Sized>(
        backend: &mut B,
        previous: Option<Self>,
        score: &Score,
        speed: f64,
        muted: &TrackSet,
        min_audible: f64,
        origin: f64,
    ) -> Self {
        let stale = match previous {
            Some(batch) if batch.live => batch.handles,
            _ => Vec::new(),
        };
        let events = schedule_score(score, speed, muted, min_audible);
        let handles = backend.reschedule(&stale, &events, origin);
        debug!(
            cancelled = stale.len(),
            triggers = handles.len(),
            speed,
            origin,
            "batch replaced"
        );
        Self {
            handles,
            speed,
            muted: muted.clone(),
            live: true,
        }
    }

    /// Cancel every trigger and force-silence all voices.
    ///
    /// Returns the number of triggers removed; 0 if already cancelled.
    pub fn cancel<B: AudioClock + VoiceOutput + ?Sized>(&mut self, backend: &mut B) -> usize {
        if !self.live {
            return 0;
        }
        self.live = false;
        let cancelled = backend.cancel_many(&self.handles);
        backend.silence_all();
        debug!(cancelled, "batch cancelled");
        cancelled
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Speed the trigger times were computed with.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Tracks excluded when the batch was built.
    pub fn muted(&self) -> &TrackSet {
        &self.muted
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[ClockHandle] {
        &self.handles
    }
}

/// Peak simultaneous voices any single track needs at any of `speeds`.
///
/// Each note occupies a voice for its hold time (floored at `min_audible`)
/// plus the fixed release tail, both in clock seconds, so the answer changes
/// with speed. The result is capped at [`MAX_VOICES_PER_TRACK`].
pub fn required_polyphony(score: &Score, min_audible: f64, speeds: &[f64]) -> usize {
    let mut peak = 0;
    let mut edges: Vec<(f64, i32)> = Vec::new();
    for &speed in speeds {
        for track in score.tracks() {
            edges.clear();
            for note in track.notes() {
                let start = musical_to_clock(note.start_seconds, speed);
                let hold = musical_to_clock(note.duration_seconds, speed).max(min_audible);
                edges.push((start, 1));
                edges.push((start + hold + RELEASE_SECONDS, -1));
            }
            // Ends sort before starts at the same instant
            edges.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let mut current = 0i32;
            for &(_, delta) in &edges {
                current += delta;
                peak = peak.max(current.max(0) as usize);
            }
        }
    }
    peak.min(MAX_VOICES_PER_TRACK)
}
