//! Config file loading and the practice plan it produces.
//!
//! The TOML file has two tables, both optional:
//!
//! ```toml
//! [session]
//! active_notes_interval_ms = 50
//! count_in = { enabled = true, duration_seconds = 2 }
//!
//! [practice]
//! speed = 0.75
//! loop_start = 8.0
//! loop_end = 16.0
//! muted = [2]
//! ```
//!
//! Command-line options override the file.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;
use ws_engine::AudioBackend;
use ws_ir::{Score, TrackSet};
use ws_session::{
    PlaybackSession, SessionConfig, SessionError, SpeedTrainer, WallClock,
};

use crate::args::CliArgs;

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub session: SessionConfig,
    pub practice: PracticeDefaults,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PracticeDefaults {
    pub speed: Option<f64>,
    pub loop_start: Option<f64>,
    pub loop_end: Option<f64>,
    pub muted: Vec<usize>,
    pub solo: Option<usize>,
}

pub fn parse_config(text: &str) -> anyhow::Result<FileConfig> {
    let config: FileConfig = toml::from_str(text)?;
    config.session.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> anyhow::Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// Settings for one practice run, merged from the config file and the
/// command line.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticePlan {
    pub session: SessionConfig,
    pub speed: Option<f64>,
    pub loop_start: Option<f64>,
    pub loop_end: Option<f64>,
    pub muted: TrackSet,
    pub solo: Option<usize>,
}

impl PracticePlan {
    pub fn resolve(file: FileConfig, args: &CliArgs) -> anyhow::Result<Self> {
        let FileConfig {
            mut session,
            practice,
        } = file;

        if let Some(seconds) = args.count_in {
            session.count_in.enabled = true;
            session.count_in.duration_seconds = seconds;
        }
        if let Some((start_speed, end_speed, increment)) = args.trainer {
            session.speed_trainer = SpeedTrainer {
                enabled: true,
                start_speed,
                end_speed,
                increment,
            };
        }
        session.validate()?;

        let (loop_start, loop_end) = match args.loop_bounds {
            Some((a, b)) => (Some(a), Some(b)),
            None => (practice.loop_start, practice.loop_end),
        };
        let mut muted: TrackSet = practice.muted.into_iter().collect();
        muted.extend(&args.muted);

        Ok(Self {
            session,
            speed: args.speed.or(practice.speed),
            loop_start,
            loop_end,
            muted,
            solo: args.solo.or(practice.solo),
        })
    }

    /// Apply the plan to `session` and start playing `score`.
    pub fn start<B: AudioBackend, W: WallClock>(
        &self,
        session: &mut PlaybackSession<B, W>,
        score: Arc<Score>,
    ) -> Result<(), SessionError> {
        if let Some(speed) = self.speed {
            session.set_speed(speed)?;
        }
        if self.loop_start.is_some() {
            session.set_loop_start(self.loop_start)?;
        }
        if self.loop_end.is_some() {
            session.set_loop_end(self.loop_end)?;
        }
        session.play(score, &self.muted, &[])?;
        // Track indices are only known once the score is loaded
        if self.solo.is_some() {
            session.set_solo(self.solo)?;
        }
        debug!(plan = ?self, "practice plan applied");
        Ok(())
    }
}
