//! WAV file output for offline renders.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;
use ws_engine::Frame;

use crate::traits::{AudioError, AudioOutput};

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// 16-bit stereo PCM writer.
pub struct WavOutput<W: Write + Seek> {
    writer: WavWriter<W>,
    sample_rate: u32,
    frames: u64,
}

impl WavOutput<BufWriter<File>> {
    /// Create (or truncate) a WAV file at `path`.
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, AudioError> {
        let writer = WavWriter::create(path, spec(sample_rate))?;
        Ok(Self {
            writer,
            sample_rate,
            frames: 0,
        })
    }
}

impl<W: Write + Seek> WavOutput<W> {
    pub fn new(inner: W, sample_rate: u32) -> Result<Self, AudioError> {
        Ok(Self {
            writer: WavWriter::new(inner, spec(sample_rate))?,
            sample_rate,
            frames: 0,
        })
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Patch the header lengths and flush.
    pub fn finalize(self) -> Result<(), AudioError> {
        debug!(frames = self.frames, "wav finalized");
        self.writer.finalize()?;
        Ok(())
    }
}

impl<W: Write + Seek> AudioOutput for WavOutput<W> {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, frames: &[Frame]) -> Result<(), AudioError> {
        for frame in frames {
            let (left, right) = frame.to_i16();
            self.writer.write_sample(left)?;
            self.writer.write_sample(right)?;
        }
        self.frames += frames.len() as u64;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Encode frames as an in-memory WAV file.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let mut cursor = Cursor::new(Vec::new());
    let mut output = WavOutput::new(&mut cursor, sample_rate)?;
    output.write(frames)?;
    output.finalize()?;
    Ok(cursor.into_inner())
}
