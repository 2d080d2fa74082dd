//! Core IR types for the woodshed practice player.
//!
//! This crate defines the immutable score representation that an external
//! loader produces and the playback engine consumes, plus the pure helpers
//! shared by every layer above it (time base, track muting, pitch math).
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod analysis;
mod mute;
mod pitch;
mod score;
pub mod timebase;

pub use analysis::{analyze, ScoreSummary};
pub use mute::{resolve_muted, TrackSet};
pub use pitch::pitch_to_frequency;
pub use score::{NoteEvent, Score, ScoreError, Track, TrackName};
pub use timebase::{
    clock_to_musical, is_supported_speed, musical_to_clock, quantize_speed, MAX_SPEED, MIN_SPEED,
};
