//! Session configuration.

use serde::{Deserialize, Serialize};
use ws_engine::{MIN_AUDIBLE_DURATION, MAX_VOICES_PER_TRACK};

use crate::count_in::CountInSettings;
use crate::error::ConfigError;
use crate::trainer::SpeedTrainer;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Shortest note hold, in clock seconds
    pub min_audible_duration: f64,
    /// Minimum interval between active-note rescans
    pub active_notes_interval_ms: u64,
    /// Voice slots per track never go below this
    pub min_voices_per_track: usize,
    /// Queued events per observer before new ones are dropped
    pub observer_capacity: usize,
    /// Output ring buffer length for live playback
    pub buffer_ms: u32,
    /// Sample rate for offline renders
    pub sample_rate: u32,
    pub count_in: CountInSettings,
    pub speed_trainer: SpeedTrainer,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_audible_duration: MIN_AUDIBLE_DURATION,
            active_notes_interval_ms: 50,
            min_voices_per_track: 8,
            observer_capacity: 256,
            buffer_ms: 40,
            sample_rate: 44100,
            count_in: CountInSettings::default(),
            speed_trainer: SpeedTrainer::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_audible_duration.is_finite() && self.min_audible_duration > 0.0) {
            return Err(ConfigError::InvalidSetting("min_audible_duration must be positive"));
        }
        if !(1..=MAX_VOICES_PER_TRACK).contains(&self.min_voices_per_track) {
            return Err(ConfigError::InvalidSetting("min_voices_per_track out of range"));
        }
        if self.observer_capacity == 0 {
            return Err(ConfigError::InvalidSetting("observer_capacity must be at least 1"));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSetting("sample_rate must be positive"));
        }
        CountInSettings::check_duration(self.count_in.duration_seconds)?;
        self.speed_trainer.validate()
    }

    pub(crate) fn scan_interval_seconds(&self) -> f64 {
        self.active_notes_interval_ms as f64 / 1000.0
    }
}
