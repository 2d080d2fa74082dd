//! Score summary: scans a score to report what a practice session will play.

use alloc::vec::Vec;
use core::fmt;

use crate::score::Score;

/// Summary of a score's content.
pub struct ScoreSummary {
    pub total_notes: usize,
    pub notes_per_track: Vec<usize>,
    pub pitch_range: Option<(u8, u8)>,
    pub duration_seconds: f64,
    pub tempo_bpm: f64,
}

/// Analyze a score and return a summary of its content.
pub fn analyze(score: &Score) -> ScoreSummary {
    let mut pitch_range: Option<(u8, u8)> = None;
    for note in score.tracks().iter().flat_map(|t| t.notes()) {
        pitch_range = Some(match pitch_range {
            Some((lo, hi)) => (lo.min(note.pitch), hi.max(note.pitch)),
            None => (note.pitch, note.pitch),
        });
    }

    ScoreSummary {
        total_notes: score.note_count(),
        notes_per_track: score.tracks().iter().map(|t| t.notes().len()).collect(),
        pitch_range,
        duration_seconds: score.duration_seconds(),
        tempo_bpm: score.initial_tempo_bpm(),
    }
}

impl fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracks:   {}", self.notes_per_track.len())?;
        writeln!(f, "Notes:    {} total", self.total_notes)?;
        for (i, count) in self.notes_per_track.iter().enumerate() {
            writeln!(f, "  #{:<2}    {} notes", i, count)?;
        }
        if let Some((lo, hi)) = self.pitch_range {
            writeln!(f, "Range:    {} - {} (MIDI)", lo, hi)?;
        }
        writeln!(f, "Tempo:    {:.1} BPM", self.tempo_bpm)?;
        writeln!(f, "Length:   {:.2}s", self.duration_seconds)
    }
}
