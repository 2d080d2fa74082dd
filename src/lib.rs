//! woodshed: a practice player for multi-track scores.
//!
//! The playback machinery lives in the `ws-*` crates; this package adds the
//! command-line front end, config files and JSON score loading.

pub mod args;
pub mod config;
pub mod score_file;

pub use args::{CliArgs, USAGE};
pub use config::{load_config, parse_config, FileConfig, PracticeDefaults, PracticePlan};
pub use score_file::{load_score, parse_score, ScoreFileError};
