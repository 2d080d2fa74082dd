//! The output sink abstraction shared by live playback and file export.

use thiserror::Error;
use ws_engine::Frame;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no output device available")]
    NoDevice,
    #[error("output device: {0}")]
    Device(String),
    #[error("output stream: {0}")]
    Stream(String),
    #[error("wav file: {0}")]
    Wav(#[from] hound::Error),
}

/// A destination for rendered stereo frames.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Hand frames to the sink in order.
    fn write(&mut self, frames: &[Frame]) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop accepting audio and flush anything buffered.
    fn stop(&mut self) -> Result<(), AudioError>;
}
