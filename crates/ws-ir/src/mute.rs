//! Effective track muting: explicit mutes plus solo override.

use alloc::collections::BTreeSet;

/// A set of track indices.
pub type TrackSet = BTreeSet<usize>;

/// Combine per-track mute flags and an optional solo into the set of tracks
/// that must not be heard.
///
/// A solo mutes every other track, including ones not explicitly muted.
/// The soloed track itself is audible even if it is in `muted`. A solo index
/// outside the score is ignored. Indices `>= track_count` never appear in
/// the result.
pub fn resolve_muted(track_count: usize, muted: &TrackSet, solo: Option<usize>) -> TrackSet {
    match solo.filter(|&s| s < track_count) {
        Some(soloed) => (0..track_count).filter(|&i| i != soloed).collect(),
        None => muted.iter().copied().filter(|&i| i < track_count).collect(),
    }
}
