//! Offline rendering: drive a session against an in-memory engine.

use std::convert::Infallible;

use tracing::info;
use ws_audio::{AudioError, AudioOutput};
use ws_engine::{Engine, Frame};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{PlaybackPhase, PlaybackSession};
use crate::wall_clock::ManualWallClock;

/// Display frames per second the renderer ticks the session at.
const TICK_RATE: u32 = 60;

pub type OfflineSession = PlaybackSession<Engine, ManualWallClock>;

/// Runs a session faster than real time, one display frame per block.
///
/// Wall time is advanced by exactly the audio rendered, so count-in and
/// throttling behave as they would live.
pub struct OfflineRenderer {
    session: OfflineSession,
    wall: ManualWallClock,
    sample_rate: u32,
}

impl OfflineRenderer {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let wall = ManualWallClock::new();
        let sample_rate = config.sample_rate;
        let mut session =
            PlaybackSession::with_wall_clock(Engine::new(sample_rate), wall.clone(), config)?;
        session.initialize()?;
        Ok(Self {
            session,
            wall,
            sample_rate,
        })
    }

    pub fn session(&self) -> &OfflineSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut OfflineSession {
        &mut self.session
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render until the session stops or `max_seconds` have been produced.
    pub fn render(&mut self, max_seconds: f64) -> Vec<Frame> {
        let mut frames = Vec::new();
        let result = self.drive::<Infallible>(max_seconds, |block| {
            frames.extend_from_slice(block);
            Ok(())
        });
        match result {
            Ok(_) => frames,
            Err(never) => match never {},
        }
    }

    /// Stream the render into `output`. Returns the number of frames written.
    pub fn render_to(
        &mut self,
        output: &mut impl AudioOutput,
        max_seconds: f64,
    ) -> Result<u64, AudioError> {
        output.start()?;
        let written = self.drive(max_seconds, |block| output.write(block))?;
        output.stop()?;
        Ok(written)
    }

    fn drive<E>(
        &mut self,
        max_seconds: f64,
        mut sink: impl FnMut(&[Frame]) -> Result<(), E>,
    ) -> Result<u64, E> {
        let block_len = (self.sample_rate / TICK_RATE).max(1) as usize;
        let max_frames = (max_seconds.max(0.0) * self.sample_rate as f64) as u64;
        let mut block = vec![Frame::silence(); block_len];
        let mut written = 0u64;

        while written < max_frames && self.session.phase() != PlaybackPhase::Stopped {
            let len = block_len.min((max_frames - written) as usize);
            self.session.backend_mut().render_block(&mut block[..len]);
            sink(&block[..len])?;
            written += len as u64;
            self.wall.advance(len as f64 / self.sample_rate as f64);
            self.session.tick();
        }

        info!(
            frames = written,
            seconds = written as f64 / self.sample_rate as f64,
            "offline render finished"
        );
        Ok(written)
    }
}
