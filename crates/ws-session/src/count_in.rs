//! Count-in pre-roll: one metronome click per second of wall time.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted count-in.
pub const MAX_COUNT_IN_SECONDS: f64 = 60.0;

/// Spacing between clicks.
pub const CLICK_INTERVAL_SECONDS: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountInSettings {
    pub enabled: bool,
    pub duration_seconds: f64,
}

impl Default for CountInSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_seconds: 4.0,
        }
    }
}

impl CountInSettings {
    pub fn check_duration(seconds: f64) -> Result<f64, ConfigError> {
        if seconds.is_finite() && seconds > 0.0 && seconds <= MAX_COUNT_IN_SECONDS {
            Ok(seconds)
        } else {
            Err(ConfigError::InvalidCountInDuration(seconds))
        }
    }
}

/// What one poll of a running count-in produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountInStep {
    /// Click indices that became due, in order
    pub clicks: Range<u32>,
    /// Pre-roll elapsed; playback may start
    pub finished: bool,
}

/// A running count-in, timed against wall-clock seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct CountIn {
    started_at: f64,
    duration: f64,
    clicks_sent: u32,
    /// Musical position playback starts from once the count-in finishes
    target: f64,
}

impl CountIn {
    pub fn start(now: f64, duration: f64, target: f64) -> Self {
        Self {
            started_at: now,
            duration,
            clicks_sent: 0,
            target,
        }
    }

    /// Clicks this count-in plays in total.
    pub fn total_clicks(&self) -> u32 {
        (self.duration / CLICK_INTERVAL_SECONDS).ceil() as u32
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Report clicks that became due since the last poll.
    ///
    /// Click `k` is due at `k` seconds after start. Every click is reported
    /// before the step that reports `finished`.
    pub fn poll(&mut self, now: f64) -> CountInStep {
        let elapsed = (now - self.started_at).max(0.0);
        let due = ((elapsed / CLICK_INTERVAL_SECONDS).floor() as u32 + 1).min(self.total_clicks());
        let first = self.clicks_sent;
        self.clicks_sent = self.clicks_sent.max(due);
        CountInStep {
            clicks: first..self.clicks_sent,
            finished: elapsed >= self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_seconds_give_three_clicks() {
        let mut count_in = CountIn::start(10.0, 3.0, 0.0);
        let mut clicks = Vec::new();
        let mut finished_at = None;
        for step in 0..=40 {
            let now = 10.0 + step as f64 * 0.1;
            let result = count_in.poll(now);
            clicks.extend(result.clicks.map(|c| (c, now)));
            if result.finished {
                finished_at = Some(now);
                break;
            }
        }
        let times: Vec<u32> = clicks.iter().map(|&(c, _)| c).collect();
        assert_eq!(times, vec![0, 1, 2]);
        assert!((clicks[1].1 - 11.0).abs() < 1e-9);
        assert!((clicks[2].1 - 12.0).abs() < 1e-9);
        assert!((finished_at.unwrap() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn late_poll_reports_all_missed_clicks() {
        let mut count_in = CountIn::start(0.0, 4.0, 2.0);
        let step = count_in.poll(10.0);
        assert_eq!(step.clicks, 0..4);
        assert!(step.finished);
        assert_eq!(count_in.target(), 2.0);
    }

    #[test]
    fn fractional_duration_rounds_clicks_up() {
        let count_in = CountIn::start(0.0, 2.5, 0.0);
        assert_eq!(count_in.total_clicks(), 3);
    }

    #[test]
    fn duration_validation() {
        assert!(CountInSettings::check_duration(3.0).is_ok());
        for bad in [0.0, -1.0, f64::NAN, MAX_COUNT_IN_SECONDS + 1.0] {
            assert!(CountInSettings::check_duration(bad).is_err());
        }
    }
}
