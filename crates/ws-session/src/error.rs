//! Session error types.

use thiserror::Error;
use ws_engine::EngineError;

/// A rejected parameter change. The previous value is always retained.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("speed {0} is outside the supported range {min}..={max}", min = ws_ir::MIN_SPEED, max = ws_ir::MAX_SPEED)]
    UnsupportedSpeed(f64),
    #[error("invalid loop bound {0}")]
    InvalidLoopBound(f64),
    #[error("loop needs both a start and an end")]
    LoopBoundsMissing,
    #[error("invalid seek target {0}")]
    InvalidSeek(f64),
    #[error("count-in duration {0} must be within 0..={max} seconds", max = crate::count_in::MAX_COUNT_IN_SECONDS)]
    InvalidCountInDuration(f64),
    #[error("invalid speed trainer: {0}")]
    InvalidTrainer(&'static str),
    #[error("volume {0} exceeds 100")]
    VolumeOutOfRange(u8),
    #[error("track {index} does not exist (score has {track_count})")]
    UnknownTrack { index: usize, track_count: usize },
    #[error("invalid session config: {0}")]
    InvalidSetting(&'static str),
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
