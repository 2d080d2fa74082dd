//! Default-device output through cpal.
//!
//! The render thread pushes frames into a lock-free ring; the device callback
//! drains it and plays silence whenever the ring runs dry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info, warn};
use ws_engine::Frame;

use crate::traits::{AudioError, AudioOutput};

/// Back-off while the ring is full.
const FULL_RING_WAIT: Duration = Duration::from_micros(500);

pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    enabled: Arc<AtomicBool>,
    /// Device callbacks that found the ring short
    underruns: Arc<AtomicU64>,
}

impl CpalOutput {
    /// Open the default output device with a ring holding `buffer_ms` of
    /// audio. The consumer half goes to [`build_stream`](Self::build_stream).
    pub fn new(buffer_ms: u32) -> Result<(Self, HeapCons<Frame>), AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            warn!(format = ?supported.sample_format(), "device default is not f32, requesting f32 anyway");
        }
        let config: StreamConfig = supported.into();

        let capacity = ring_capacity(config.sample_rate.0, buffer_ms);
        let (producer, consumer) = HeapRb::<Frame>::new(capacity).split();

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            capacity,
            "output device opened"
        );

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            enabled: Arc::new(AtomicBool::new(false)),
            underruns: Arc::new(AtomicU64::new(0)),
        };
        Ok((output, consumer))
    }

    /// Create the device stream. It stays silent until [`AudioOutput::start`].
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let enabled = self.enabled.clone();
        let underruns = self.underruns.clone();
        let channels = usize::from(self.config.channels.max(1));

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !enabled.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let mut starved = false;
                    for chunk in data.chunks_mut(channels) {
                        let frame = consumer.try_pop().unwrap_or_else(|| {
                            starved = true;
                            Frame::silence()
                        });
                        write_interleaved(chunk, frame);
                    }
                    if starved {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                |err| error!(%err, "output stream error"),
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    /// Queue `frames`, waiting for room as the device drains the ring.
    ///
    /// Returns early once `cancel` is set; the result is the number queued.
    pub fn write_blocking(&mut self, frames: &[Frame], cancel: &AtomicBool) -> usize {
        let mut queued = self.producer.push_slice(frames);
        while queued < frames.len() && !cancel.load(Ordering::Relaxed) {
            thread::sleep(FULL_RING_WAIT);
            queued += self.producer.push_slice(&frames[queued..]);
        }
        queued
    }

    /// Frames queued but not yet played.
    pub fn buffered(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Queue what fits without waiting; the rest is dropped.
    fn write(&mut self, frames: &[Frame]) -> Result<(), AudioError> {
        let queued = self.producer.push_slice(frames);
        if queued < frames.len() {
            debug!(dropped = frames.len() - queued, "output ring full");
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.enabled.store(true, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.enabled.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream.pause().map_err(|e| AudioError::Stream(e.to_string()))?;
        }
        let underruns = self.underruns();
        if underruns > 0 {
            warn!(underruns, "output ran dry during playback");
        }
        Ok(())
    }
}

/// Ring length for `buffer_ms` of audio, never below 64 frames.
fn ring_capacity(sample_rate: u32, buffer_ms: u32) -> usize {
    (sample_rate as usize * buffer_ms.max(1) as usize / 1000).max(64)
}

/// Spread a stereo frame over one interleaved device frame of any width.
fn write_interleaved(chunk: &mut [f32], frame: Frame) {
    match chunk {
        [] => {}
        [mono] => *mono = 0.5 * (frame.left + frame.right),
        [left, right, rest @ ..] => {
            *left = frame.left;
            *right = frame.right;
            rest.fill(0.0);
        }
    }
}
