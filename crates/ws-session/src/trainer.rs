//! Speed trainer: raise the speed a step on every loop repetition.

use serde::{Deserialize, Serialize};
use ws_ir::{is_supported_speed, quantize_speed, MAX_SPEED};

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTrainer {
    pub enabled: bool,
    pub start_speed: f64,
    pub end_speed: f64,
    /// Added to the speed on each loop wrap
    pub increment: f64,
}

impl Default for SpeedTrainer {
    fn default() -> Self {
        Self {
            enabled: false,
            start_speed: 0.5,
            end_speed: 1.0,
            increment: 0.05,
        }
    }
}

/// A partial trainer update. `None` fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerPatch {
    pub enabled: Option<bool>,
    pub start_speed: Option<f64>,
    pub end_speed: Option<f64>,
    pub increment: Option<f64>,
}

impl SpeedTrainer {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_supported_speed(self.start_speed) || !is_supported_speed(self.end_speed) {
            return Err(ConfigError::InvalidTrainer("speeds must be within the supported range"));
        }
        if self.start_speed > self.end_speed {
            return Err(ConfigError::InvalidTrainer("start speed exceeds end speed"));
        }
        if !(self.increment.is_finite() && self.increment > 0.0 && self.increment <= MAX_SPEED) {
            return Err(ConfigError::InvalidTrainer("increment must be positive"));
        }
        Ok(())
    }

    /// Apply `patch`, returning the validated result. `self` is untouched.
    pub fn patched(&self, patch: TrainerPatch) -> Result<Self, ConfigError> {
        let next = Self {
            enabled: patch.enabled.unwrap_or(self.enabled),
            start_speed: quantize_speed(patch.start_speed.unwrap_or(self.start_speed)),
            end_speed: quantize_speed(patch.end_speed.unwrap_or(self.end_speed)),
            increment: quantize_speed(patch.increment.unwrap_or(self.increment)),
        };
        next.validate()?;
        Ok(next)
    }

    /// Speed after one more loop repetition.
    ///
    /// Never decreases and never passes `end_speed`; a speed already above
    /// the ceiling is kept as is.
    pub fn next_speed(&self, current: f64) -> f64 {
        if current >= self.end_speed {
            return current;
        }
        quantize_speed((current + self.increment).min(self.end_speed))
    }
}
