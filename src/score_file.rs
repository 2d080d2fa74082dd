//! JSON score files.
//!
//! A score file lists tracks of notes in score seconds:
//!
//! ```json
//! {
//!   "tempo_bpm": 96,
//!   "tracks": [
//!     { "name": "melody", "notes": [ { "pitch": 67, "start": 0.0, "duration": 0.5 } ] }
//!   ]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use ws_ir::{NoteEvent, Score, ScoreError, Track};

#[derive(Debug, Error)]
pub enum ScoreFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed score file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid score: {0}")]
    Score(#[from] ScoreError),
}

fn default_tempo() -> f64 {
    120.0
}

fn default_ticks() -> u16 {
    480
}

fn default_velocity() -> f32 {
    0.8
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScoreDoc {
    #[serde(default = "default_tempo")]
    tempo_bpm: f64,
    #[serde(default = "default_ticks")]
    ticks_per_quarter: u16,
    /// Overrides the derived length, e.g. to keep a trailing rest
    #[serde(default)]
    duration: Option<f64>,
    tracks: Vec<TrackDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrackDoc {
    #[serde(default)]
    name: String,
    #[serde(default)]
    notes: Vec<NoteDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoteDoc {
    pitch: u8,
    start: f64,
    duration: f64,
    #[serde(default = "default_velocity")]
    velocity: f32,
}

/// Parse a score from JSON text.
pub fn parse_score(json: &str) -> Result<Score, ScoreFileError> {
    let doc: ScoreDoc = serde_json::from_str(json)?;
    let tracks = doc
        .tracks
        .into_iter()
        .enumerate()
        .map(|(i, track)| {
            let name = if track.name.is_empty() {
                format!("track {}", i + 1)
            } else {
                track.name
            };
            let notes = track
                .notes
                .into_iter()
                .map(|n| NoteEvent::new(n.pitch, n.start, n.duration, n.velocity))
                .collect();
            Track::new(&name, notes)
        })
        .collect();

    let score = Score::new(tracks, doc.tempo_bpm, doc.ticks_per_quarter)?;
    match doc.duration {
        Some(duration) => Ok(score.with_duration(duration)?),
        None => Ok(score),
    }
}

/// Read and parse a score file.
pub fn load_score(path: impl AsRef<Path>) -> Result<Score, ScoreFileError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|source| ScoreFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_score(&json)
}
