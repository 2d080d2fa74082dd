//! A-B practice loop bounds.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Loop bounds in musical seconds.
///
/// `start <= end` always holds: setting a bound that would cross the other
/// swaps them. The loop enables itself the moment both bounds are set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    start: Option<f64>,
    end: Option<f64>,
    enabled: bool,
}

/// What a bound change did to the enabled flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopChange {
    Unchanged,
    Enabled,
    Disabled,
}

impl LoopRegion {
    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Both bounds, when set.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.start?, self.end?))
    }

    /// Enabled with a non-empty span. Only an active loop can wrap.
    pub fn is_active(&self) -> bool {
        self.enabled && self.bounds().is_some_and(|(s, e)| e > s)
    }

    /// Whether `position` has reached the loop end.
    pub fn should_wrap(&self, position: f64) -> bool {
        self.is_active() && self.end.is_some_and(|end| position >= end)
    }

    pub fn set_start(&mut self, start: Option<f64>) -> Result<LoopChange, ConfigError> {
        let start = start.map(check_bound).transpose()?;
        let (was, had_pair) = (self.enabled, self.bounds().is_some());
        self.start = start;
        self.normalize(had_pair);
        Ok(self.change_from(was))
    }

    pub fn set_end(&mut self, end: Option<f64>) -> Result<LoopChange, ConfigError> {
        let end = end.map(check_bound).transpose()?;
        let (was, had_pair) = (self.enabled, self.bounds().is_some());
        self.end = end;
        self.normalize(had_pair);
        Ok(self.change_from(was))
    }

    /// Flip the enabled flag. Needs both bounds.
    pub fn toggle(&mut self) -> Result<LoopChange, ConfigError> {
        if self.bounds().is_none() {
            return Err(ConfigError::LoopBoundsMissing);
        }
        let was = self.enabled;
        self.enabled = !was;
        Ok(self.change_from(was))
    }

    pub fn clear(&mut self) -> LoopChange {
        let was = self.enabled;
        *self = Self::default();
        self.change_from(was)
    }

    /// Clamp both bounds into `[0, duration]`.
    pub fn clamp_to(&mut self, duration: f64) {
        let clamp = |v: f64| v.clamp(0.0, duration.max(0.0));
        self.start = self.start.map(clamp);
        self.end = self.end.map(clamp);
    }

    fn normalize(&mut self, had_pair: bool) {
        match (self.start, self.end) {
            (Some(s), Some(e)) => {
                if s > e {
                    self.start = Some(e);
                    self.end = Some(s);
                }
                // Completing the pair enables; later edits keep the flag
                if !had_pair {
                    self.enabled = true;
                }
            }
            _ => self.enabled = false,
        }
    }

    fn change_from(&self, was_enabled: bool) -> LoopChange {
        match (was_enabled, self.enabled) {
            (false, true) => LoopChange::Enabled,
            (true, false) => LoopChange::Disabled,
            _ => LoopChange::Unchanged,
        }
    }
}

fn check_bound(value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidLoopBound(value))
    }
}
