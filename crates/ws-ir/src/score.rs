//! Score structure: tracks of timed note events.

use alloc::vec::Vec;
use arrayvec::ArrayString;
use thiserror::Error;

/// Fixed-capacity track name.
pub type TrackName = ArrayString<32>;

/// Highest valid MIDI pitch.
const MAX_PITCH: u8 = 127;

/// Errors raised while building a score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("track {track}: pitch {pitch} is outside 0..=127")]
    InvalidPitch { track: usize, pitch: u8 },
    #[error("track {track}: velocity {velocity} is outside 0..=1")]
    InvalidVelocity { track: usize, velocity: f32 },
    #[error("track {track}: note at {start}s with duration {duration}s is not a valid time span")]
    InvalidTiming { track: usize, start: f64, duration: f64 },
    #[error("tempo {0} BPM must be positive")]
    InvalidTempo(f64),
    #[error("score duration {0}s must be finite and non-negative")]
    InvalidDuration(f64),
}

/// A single note in score time (seconds at speed 1.0).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    /// MIDI pitch (0-127)
    pub pitch: u8,
    /// Onset in score seconds
    pub start_seconds: f64,
    /// Length in score seconds
    pub duration_seconds: f64,
    /// Normalized velocity (0.0-1.0)
    pub velocity: f32,
}

impl NoteEvent {
    pub const fn new(pitch: u8, start_seconds: f64, duration_seconds: f64, velocity: f32) -> Self {
        Self {
            pitch,
            start_seconds,
            duration_seconds,
            velocity,
        }
    }

    /// Score time at which the note stops sounding.
    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }

    /// Whether the note is sounding at `position` (half-open interval).
    pub fn overlaps(&self, position: f64) -> bool {
        self.start_seconds <= position && position < self.end_seconds()
    }
}

/// One instrument part of a score.
#[derive(Clone, Debug)]
pub struct Track {
    index: usize,
    /// Display name
    pub name: TrackName,
    /// Notes sorted ascending by onset
    notes: Vec<NoteEvent>,
    /// Longest note duration, bounds the active-note scan
    longest_note: f64,
}

impl Track {
    /// Create a track from unsorted notes. The index is assigned by [`Score::new`].
    pub fn new(name: &str, mut notes: Vec<NoteEvent>) -> Self {
        notes.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        let longest_note = notes
            .iter()
            .map(|n| n.duration_seconds)
            .fold(0.0, f64::max);
        let mut track_name = TrackName::new();
        for ch in name.chars() {
            if track_name.try_push(ch).is_err() {
                break;
            }
        }
        Self {
            index: 0,
            name: track_name,
            notes,
            longest_note,
        }
    }

    /// Position of this track in its score.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Notes sorted by onset.
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    /// Score time at which the last note of this track ends.
    pub fn end_seconds(&self) -> f64 {
        self.notes.iter().map(NoteEvent::end_seconds).fold(0.0, f64::max)
    }

    /// Notes sounding at `position`.
    ///
    /// Only notes whose onset lies within the longest note duration before
    /// `position` can overlap it, so the scan is bounded to that window.
    pub fn sounding_at(&self, position: f64) -> impl Iterator<Item = &NoteEvent> + '_ {
        let upper = self.notes.partition_point(|n| n.start_seconds <= position);
        let window_start = position - self.longest_note;
        let lower = self.notes[..upper].partition_point(|n| n.start_seconds < window_start);
        self.notes[lower..upper]
            .iter()
            .filter(move |n| n.overlaps(position))
    }

    fn validate(&self) -> Result<(), ScoreError> {
        for note in &self.notes {
            if note.pitch > MAX_PITCH {
                return Err(ScoreError::InvalidPitch {
                    track: self.index,
                    pitch: note.pitch,
                });
            }
            if !(0.0..=1.0).contains(&note.velocity) {
                return Err(ScoreError::InvalidVelocity {
                    track: self.index,
                    velocity: note.velocity,
                });
            }
            let timing_ok = note.start_seconds.is_finite()
                && note.duration_seconds.is_finite()
                && note.start_seconds >= 0.0
                && note.duration_seconds >= 0.0;
            if !timing_ok {
                return Err(ScoreError::InvalidTiming {
                    track: self.index,
                    start: note.start_seconds,
                    duration: note.duration_seconds,
                });
            }
        }
        Ok(())
    }
}

/// A complete, immutable multi-track score.
#[derive(Clone, Debug)]
pub struct Score {
    tracks: Vec<Track>,
    duration_seconds: f64,
    initial_tempo_bpm: f64,
    ticks_per_quarter: u16,
}

impl Score {
    /// Build a score, assigning track indices in order.
    ///
    /// The duration is the end of the last sounding note.
    pub fn new(
        mut tracks: Vec<Track>,
        initial_tempo_bpm: f64,
        ticks_per_quarter: u16,
    ) -> Result<Self, ScoreError> {
        if !(initial_tempo_bpm.is_finite() && initial_tempo_bpm > 0.0) {
            return Err(ScoreError::InvalidTempo(initial_tempo_bpm));
        }
        for (i, track) in tracks.iter_mut().enumerate() {
            track.index = i;
            track.validate()?;
        }
        let duration_seconds = tracks.iter().map(Track::end_seconds).fold(0.0, f64::max);
        Ok(Self {
            tracks,
            duration_seconds,
            initial_tempo_bpm,
            ticks_per_quarter,
        })
    }

    /// Override the duration, e.g. to keep trailing rests the loader knows about.
    ///
    /// The duration never shrinks below the end of the last note.
    pub fn with_duration(mut self, duration_seconds: f64) -> Result<Self, ScoreError> {
        if !(duration_seconds.is_finite() && duration_seconds >= 0.0) {
            return Err(ScoreError::InvalidDuration(duration_seconds));
        }
        self.duration_seconds = self.duration_seconds.max(duration_seconds);
        Ok(self)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn initial_tempo_bpm(&self) -> f64 {
        self.initial_tempo_bpm
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    /// Total number of notes across all tracks.
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}
