//! The playback session state machine.
//!
//! A [`PlaybackSession`] owns every piece of mutable playback state and is
//! its only writer. Callers drive it with commands and call [`tick`] once per
//! display frame; observers follow along through [`SessionEvent`]s.
//!
//! [`tick`]: PlaybackSession::tick

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use ws_engine::{required_polyphony, AudioBackend, EngineError, ScheduledBatch};
use ws_ir::{
    is_supported_speed, musical_to_clock, quantize_speed, resolve_muted, Score, TrackSet, MAX_SPEED,
    MIN_SPEED,
};

use crate::config::SessionConfig;
use crate::count_in::{CountIn, CountInSettings};
use crate::error::{ConfigError, SessionError};
use crate::loop_region::{LoopChange, LoopRegion};
use crate::publisher::{classify, ActiveNote, ClockPublisher, FrameSignal, FrameTask};
use crate::trainer::{SpeedTrainer, TrainerPatch};
use crate::wall_clock::{SystemWallClock, WallClock};

const FULL_VOLUME: u8 = 100;

/// Minimum wall time between voice-stealing reports.
const STEAL_REPORT_INTERVAL: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    #[default]
    Stopped,
    CountingIn,
    Playing,
    Paused,
}

/// Everything a view needs to draw the transport.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub phase: PlaybackPhase,
    pub musical_position: f64,
    pub duration: f64,
    pub speed: f64,
    pub loop_region: LoopRegion,
    pub active_notes: Vec<ActiveNote>,
    pub count_in: CountInSettings,
    pub speed_trainer: SpeedTrainer,
    pub track_volumes: Vec<u8>,
    pub muted_tracks: Vec<usize>,
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged { from: PlaybackPhase, to: PlaybackPhase },
    Position { position: f64 },
    SpeedChanged { speed: f64 },
    LoopChanged { region: LoopRegion },
    LoopWrapped { count: u64, speed: f64 },
    CountInClick { index: u32, accent: bool },
    VoicesStolen { count: u64 },
    ActiveNotes { notes: Vec<ActiveNote> },
    Error { message: String },
}

pub struct PlaybackSession<B: AudioBackend, W: WallClock = SystemWallClock> {
    backend: B,
    wall: W,
    config: SessionConfig,
    score: Option<Arc<Score>>,
    phase: PlaybackPhase,
    speed: f64,
    /// Musical position while not playing; last sample while playing
    position: f64,
    loop_region: LoopRegion,
    count_in: CountInSettings,
    pending_count_in: Option<CountIn>,
    trainer: SpeedTrainer,
    volumes: Vec<u8>,
    mute_flags: TrackSet,
    solo: Option<usize>,
    /// Effective muted set after solo resolution
    muted: TrackSet,
    batch: Option<ScheduledBatch>,
    publisher: ClockPublisher,
    observers: Vec<Sender<SessionEvent>>,
    last_error: Option<SessionError>,
    wraps: u64,
    /// Backend steal count at the last report, and when it was made
    steals_reported: u64,
    steals_reported_at: f64,
}

impl<B: AudioBackend> PlaybackSession<B, SystemWallClock> {
    pub fn new(backend: B, config: SessionConfig) -> Result<Self, ConfigError> {
        Self::with_wall_clock(backend, SystemWallClock::new(), config)
    }
}

impl<B: AudioBackend, W: WallClock> PlaybackSession<B, W> {
    pub fn with_wall_clock(backend: B, wall: W, config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let trainer = config.speed_trainer;
        let speed = if trainer.enabled {
            trainer.start_speed
        } else {
            1.0
        };
        Ok(Self {
            backend,
            wall,
            publisher: ClockPublisher::new(config.scan_interval_seconds()),
            count_in: config.count_in,
            config,
            score: None,
            phase: PlaybackPhase::Stopped,
            speed,
            position: 0.0,
            loop_region: LoopRegion::default(),
            pending_count_in: None,
            trainer,
            volumes: Vec::new(),
            mute_flags: TrackSet::new(),
            solo: None,
            muted: TrackSet::new(),
            batch: None,
            observers: Vec::new(),
            last_error: None,
            wraps: 0,
            steals_reported: 0,
            steals_reported_at: f64::NEG_INFINITY,
        })
    }

    // --- Accessors ---

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Current musical position. Sampled live from the clock while playing.
    pub fn position(&self) -> f64 {
        match self.phase {
            PlaybackPhase::Playing => self.publisher.sample(&self.backend, self.speed),
            _ => self.position,
        }
    }

    pub fn duration(&self) -> f64 {
        self.score.as_ref().map_or(0.0, |s| s.duration_seconds())
    }

    pub fn score(&self) -> Option<&Arc<Score>> {
        self.score.as_ref()
    }

    pub fn loop_region(&self) -> &LoopRegion {
        &self.loop_region
    }

    pub fn count_in(&self) -> &CountInSettings {
        &self.count_in
    }

    pub fn speed_trainer(&self) -> &SpeedTrainer {
        &self.trainer
    }

    pub fn track_volumes(&self) -> &[u8] {
        &self.volumes
    }

    /// Effective muted set, after solo resolution.
    pub fn muted_tracks(&self) -> &TrackSet {
        &self.muted
    }

    pub fn solo(&self) -> Option<usize> {
        self.solo
    }

    pub fn active_notes(&self) -> &[ActiveNote] {
        self.publisher.active_notes()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// Whether a scheduled batch is currently live.
    pub fn has_live_batch(&self) -> bool {
        self.batch.as_ref().is_some_and(ScheduledBatch::is_live)
    }

    /// Loop repetitions since the session was created.
    pub fn wrap_count(&self) -> u64 {
        self.wraps
    }

    /// The running frame task, if playing.
    pub fn frame_task(&self) -> Option<FrameTask> {
        self.publisher.current()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            phase: self.phase,
            musical_position: self.position(),
            duration: self.duration(),
            speed: self.speed,
            loop_region: self.loop_region,
            active_notes: self.publisher.active_notes().to_vec(),
            count_in: self.count_in,
            speed_trainer: self.trainer,
            track_volumes: self.volumes.clone(),
            muted_tracks: self.muted.iter().copied().collect(),
            last_error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    /// Receive every event emitted from now on.
    ///
    /// Events are dropped for an observer whose queue is full; a dropped
    /// receiver unsubscribes itself.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = bounded(self.config.observer_capacity);
        self.observers.push(tx);
        rx
    }

    // --- Lifecycle ---

    /// Bring up the audio backend. Idempotent.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        if self.backend.is_initialized() {
            return Ok(());
        }
        match self.backend.initialize() {
            Ok(()) => {
                info!("audio backend initialized");
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    /// Start or resume playback of `score`.
    ///
    /// `muted` replaces the per-track mute flags; `volumes` overrides the
    /// leading tracks' volumes. Ignored while already playing or counting in.
    pub fn play(
        &mut self,
        score: Arc<Score>,
        muted: &TrackSet,
        volumes: &[u8],
    ) -> Result<(), SessionError> {
        if matches!(self.phase, PlaybackPhase::Playing | PlaybackPhase::CountingIn) {
            debug!(phase = ?self.phase, "play ignored");
            return Ok(());
        }
        if let Some(&volume) = volumes.iter().find(|&&v| v > FULL_VOLUME) {
            return self.fail(ConfigError::VolumeOutOfRange(volume));
        }
        if !self.backend.is_initialized() {
            return self.fail(EngineError::ClockUnavailable(
                "backend not initialized".into(),
            ));
        }

        if !self.score.as_ref().is_some_and(|s| Arc::ptr_eq(s, &score)) {
            self.load_score(score);
        }
        self.mute_flags = muted.clone();
        for (slot, &volume) in self.volumes.iter_mut().zip(volumes) {
            *slot = volume;
        }
        self.apply_gains();
        self.last_error = None;

        let start = match self.loop_region.bounds() {
            Some((start, _)) if self.loop_region.is_active() => start,
            _ if self.position >= self.duration() => 0.0,
            _ => self.position,
        };

        if self.count_in.enabled {
            self.begin_count_in(start);
        } else {
            self.enter_playing(start);
        }
        Ok(())
    }

    /// Halt playback, keeping the position. Ringing voices decay naturally.
    ///
    /// During a count-in this cancels the count-in and keeps its start
    /// position.
    pub fn pause(&mut self) {
        match self.phase {
            PlaybackPhase::Playing => {
                self.position = self.publisher.sample(&self.backend, self.speed);
                self.backend.pause();
                self.publisher.cancel();
                self.set_phase(PlaybackPhase::Paused);
            }
            PlaybackPhase::CountingIn => {
                if let Some(count_in) = self.pending_count_in.take() {
                    self.position = count_in.target();
                }
                self.backend.pause();
                self.set_phase(PlaybackPhase::Paused);
            }
            PlaybackPhase::Stopped | PlaybackPhase::Paused => {}
        }
    }

    /// Stop from any state: cancel the batch, silence every voice, rewind.
    pub fn stop(&mut self) {
        self.halt();
        self.position = 0.0;
        if self.publisher.clear_active() {
            self.emit(SessionEvent::ActiveNotes { notes: Vec::new() });
        }
        self.set_phase(PlaybackPhase::Stopped);
    }

    // --- Transport ---

    /// Move to `seconds` of musical time, clamped to the score.
    pub fn seek_to(&mut self, seconds: f64) -> Result<(), SessionError> {
        if !seconds.is_finite() {
            return self.fail(ConfigError::InvalidSeek(seconds));
        }
        let target = self.clamp_to_score(seconds);
        match self.phase {
            PlaybackPhase::Playing => {
                self.backend.silence_all();
                self.jump_to(target);
            }
            PlaybackPhase::CountingIn => {
                if let Some(count_in) = self.pending_count_in.as_mut() {
                    count_in.set_target(target);
                }
            }
            PlaybackPhase::Stopped | PlaybackPhase::Paused => {}
        }
        self.position = target;
        self.emit(SessionEvent::Position { position: target });
        Ok(())
    }

    /// Set the playback speed. While playing, the batch is rebuilt at the
    /// new speed and the position stays continuous.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), SessionError> {
        if !is_supported_speed(speed) {
            return self.fail(ConfigError::UnsupportedSpeed(speed));
        }
        self.apply_speed(quantize_speed(speed));
        Ok(())
    }

    // --- Loop ---

    pub fn set_loop_start(&mut self, seconds: Option<f64>) -> Result<(), SessionError> {
        match self.loop_region.set_start(seconds) {
            Ok(change) => {
                self.after_loop_change(change);
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn set_loop_end(&mut self, seconds: Option<f64>) -> Result<(), SessionError> {
        match self.loop_region.set_end(seconds) {
            Ok(change) => {
                self.after_loop_change(change);
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn toggle_loop(&mut self) -> Result<(), SessionError> {
        match self.loop_region.toggle() {
            Ok(change) => {
                self.after_loop_change(change);
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn clear_loop(&mut self) {
        let change = self.loop_region.clear();
        self.after_loop_change(change);
    }

    // --- Count-in ---

    /// Enable or disable the count-in. A count-in already running completes.
    pub fn toggle_count_in(&mut self) {
        self.count_in.enabled = !self.count_in.enabled;
        debug!(enabled = self.count_in.enabled, "count-in toggled");
    }

    pub fn set_count_in_duration(&mut self, seconds: f64) -> Result<(), SessionError> {
        match CountInSettings::check_duration(seconds) {
            Ok(seconds) => {
                self.count_in.duration_seconds = seconds;
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    // --- Tracks ---

    /// Set one track's volume (0-100). Applies immediately, lock-free.
    pub fn set_track_volume(&mut self, index: usize, volume: u8) -> Result<(), SessionError> {
        self.check_track(index)?;
        if volume > FULL_VOLUME {
            return self.fail(ConfigError::VolumeOutOfRange(volume));
        }
        self.volumes[index] = volume;
        self.backend.set_volume(index, volume);
        Ok(())
    }

    /// Mute or unmute one track. Applies immediately through the voice gain.
    pub fn set_track_muted(&mut self, index: usize, muted: bool) -> Result<(), SessionError> {
        self.check_track(index)?;
        if muted {
            self.mute_flags.insert(index);
        } else {
            self.mute_flags.remove(&index);
        }
        self.apply_mutes();
        Ok(())
    }

    /// Solo one track (muting every other), or clear the solo with `None`.
    pub fn set_solo(&mut self, solo: Option<usize>) -> Result<(), SessionError> {
        if let Some(index) = solo {
            self.check_track(index)?;
        }
        self.solo = solo;
        self.apply_mutes();
        Ok(())
    }

    // --- Speed trainer ---

    /// Enabling sets the speed to the trainer's start speed immediately.
    pub fn toggle_speed_trainer(&mut self) {
        self.trainer.enabled = !self.trainer.enabled;
        debug!(enabled = self.trainer.enabled, "speed trainer toggled");
        if self.trainer.enabled {
            self.apply_speed(self.trainer.start_speed);
        }
    }

    pub fn set_speed_trainer_config(&mut self, patch: TrainerPatch) -> Result<(), SessionError> {
        let next = match self.trainer.patched(patch) {
            Ok(next) => next,
            Err(err) => return self.fail(err),
        };
        let enabling = next.enabled && !self.trainer.enabled;
        self.trainer = next;
        if enabling {
            self.apply_speed(next.start_speed);
        }
        Ok(())
    }

    // --- Frame task ---

    /// Advance the session by one display frame.
    pub fn tick(&mut self) {
        match self.phase {
            PlaybackPhase::CountingIn => self.poll_count_in(),
            PlaybackPhase::Playing => {
                if let Some(task) = self.publisher.current() {
                    self.run_frame(task);
                }
            }
            PlaybackPhase::Stopped | PlaybackPhase::Paused => {}
        }
    }

    /// Run one publisher step for `task`. Returns false, doing nothing, if
    /// the task is no longer current.
    pub fn run_frame(&mut self, task: FrameTask) -> bool {
        if self.phase != PlaybackPhase::Playing || !self.publisher.is_current(task) {
            trace!("stale frame discarded");
            return false;
        }
        let Some(score) = self.score.clone() else {
            return false;
        };

        let position = self.publisher.sample(&self.backend, self.speed);
        self.position = position;
        self.emit(SessionEvent::Position { position });

        let now = self.wall.seconds();
        if let Some(notes) = self.publisher.refresh(&score, position, &self.muted, now) {
            let notes = notes.to_vec();
            self.emit(SessionEvent::ActiveNotes { notes });
        }
        self.report_steals(now);

        match classify(position, &self.loop_region, score.duration_seconds()) {
            FrameSignal::LoopWrap => self.wrap(),
            FrameSignal::ScoreEnd => {
                info!(position, "reached end of score");
                self.stop();
            }
            FrameSignal::Continue => {}
        }
        true
    }

    // --- Internals ---

    fn load_score(&mut self, score: Arc<Score>) {
        self.halt();
        self.set_phase(PlaybackPhase::Stopped);

        let track_count = score.track_count();
        let voices = required_polyphony(
            &score,
            self.config.min_audible_duration,
            &[MIN_SPEED, MAX_SPEED],
        )
        .max(self.config.min_voices_per_track);
        self.backend.allocate(track_count, voices);

        self.volumes = vec![FULL_VOLUME; track_count];
        self.solo = None;
        self.position = self.position.clamp(0.0, score.duration_seconds());
        let region = self.loop_region;
        self.loop_region.clamp_to(score.duration_seconds());
        if region != self.loop_region {
            self.emit(SessionEvent::LoopChanged {
                region: self.loop_region,
            });
        }
        info!(
            tracks = track_count,
            notes = score.note_count(),
            duration = score.duration_seconds(),
            voices,
            "score loaded"
        );
        self.score = Some(score);
    }

    /// Cancel everything that makes sound or keeps time.
    fn halt(&mut self) {
        self.publisher.cancel();
        self.pending_count_in = None;
        if let Some(mut batch) = self.batch.take() {
            batch.cancel(&mut self.backend);
        }
        self.backend.silence_all();
        self.backend.stop();
    }

    fn enter_playing(&mut self, start: f64) {
        self.pending_count_in = None;
        self.reschedule(start);
        self.publisher.begin();
        self.set_phase(PlaybackPhase::Playing);
    }

    /// Replace the live batch with one built at the current speed and start
    /// the clock at `position`.
    fn reschedule(&mut self, position: f64) {
        let Some(score) = self.score.clone() else {
            return;
        };
        let previous = self.batch.take();
        self.batch = Some(ScheduledBatch::replace(
            &mut self.backend,
            previous,
            &score,
            self.speed,
            &self.muted,
            self.config.min_audible_duration,
            musical_to_clock(position, self.speed),
        ));
        self.position = position;
        self.publisher.invalidate_scan();
    }

    /// Log voices stolen since the last report, at most once per interval.
    fn report_steals(&mut self, now: f64) {
        let total = self.backend.steal_count();
        if total <= self.steals_reported || now - self.steals_reported_at < STEAL_REPORT_INTERVAL {
            return;
        }
        let count = total - self.steals_reported;
        warn!(count, total, "polyphony exceeded, voices stolen");
        self.steals_reported = total;
        self.steals_reported_at = now;
        self.emit(SessionEvent::VoicesStolen { count });
    }

    /// Reposition the running clock without touching the batch.
    fn jump_to(&mut self, position: f64) {
        self.backend.start(musical_to_clock(position, self.speed));
        self.position = position;
        self.publisher.invalidate_scan();
    }

    fn begin_count_in(&mut self, target: f64) {
        self.publisher.cancel();
        self.position = target;
        self.pending_count_in = Some(CountIn::start(
            self.wall.seconds(),
            self.count_in.duration_seconds,
            target,
        ));
        self.set_phase(PlaybackPhase::CountingIn);
        self.poll_count_in();
    }

    fn poll_count_in(&mut self) {
        let now = self.wall.seconds();
        let Some(count_in) = self.pending_count_in.as_mut() else {
            return;
        };
        let step = count_in.poll(now);
        let target = count_in.target();
        for index in step.clicks {
            let accent = index == 0;
            self.backend.click(accent);
            self.emit(SessionEvent::CountInClick { index, accent });
        }
        if step.finished {
            self.enter_playing(target);
        }
    }

    fn wrap(&mut self) {
        let Some((start, _)) = self.loop_region.bounds() else {
            return;
        };
        self.wraps += 1;

        let previous = self.speed;
        if self.trainer.enabled {
            self.speed = self.trainer.next_speed(self.speed);
        }
        let speed_changed = self.speed != previous;
        if speed_changed {
            self.emit(SessionEvent::SpeedChanged { speed: self.speed });
        }
        debug!(count = self.wraps, speed = self.speed, start, "loop wrapped");
        self.emit(SessionEvent::LoopWrapped {
            count: self.wraps,
            speed: self.speed,
        });

        if self.count_in.enabled {
            self.backend.pause();
            self.begin_count_in(start);
        } else if speed_changed {
            self.reschedule(start);
        } else {
            self.jump_to(start);
        }
    }

    fn apply_speed(&mut self, speed: f64) {
        if speed == self.speed {
            return;
        }
        let position = self.position();
        self.speed = speed;
        if self.phase == PlaybackPhase::Playing {
            self.reschedule(position);
        }
        debug!(speed, "speed changed");
        self.emit(SessionEvent::SpeedChanged { speed });
    }

    fn after_loop_change(&mut self, change: LoopChange) {
        let duration = self.duration();
        if self.score.is_some() {
            self.loop_region.clamp_to(duration);
        }
        self.emit(SessionEvent::LoopChanged {
            region: self.loop_region,
        });
        if change != LoopChange::Enabled {
            return;
        }
        let Some((start, _)) = self.loop_region.bounds() else {
            return;
        };
        match self.phase {
            PlaybackPhase::Playing => {
                debug!(start, "loop enabled while playing, relocating");
                self.jump_to(start);
            }
            PlaybackPhase::CountingIn => {
                if let Some(count_in) = self.pending_count_in.as_mut() {
                    count_in.set_target(start);
                }
            }
            PlaybackPhase::Stopped | PlaybackPhase::Paused => {}
        }
    }

    fn apply_gains(&mut self) {
        for (track, &volume) in self.volumes.iter().enumerate() {
            self.backend.set_volume(track, volume);
        }
        self.apply_mutes();
    }

    fn apply_mutes(&mut self) {
        let track_count = self.volumes.len();
        self.muted = resolve_muted(track_count, &self.mute_flags, self.solo);
        for track in 0..track_count {
            self.backend.set_muted(track, self.muted.contains(&track));
        }
        self.publisher.invalidate_scan();
    }

    fn check_track(&mut self, index: usize) -> Result<(), SessionError> {
        let track_count = self.volumes.len();
        if index < track_count {
            Ok(())
        } else {
            self.fail(ConfigError::UnknownTrack { index, track_count })
        }
    }

    fn clamp_to_score(&self, seconds: f64) -> f64 {
        match &self.score {
            Some(score) => seconds.clamp(0.0, score.duration_seconds()),
            None => seconds.max(0.0),
        }
    }

    fn set_phase(&mut self, to: PlaybackPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        info!(?from, ?to, "phase changed");
        self.emit(SessionEvent::PhaseChanged { from, to });
    }

    /// Record a rejected command as the session's last error.
    fn fail<T>(&mut self, err: impl Into<SessionError>) -> Result<T, SessionError> {
        let err = err.into();
        warn!(%err, "command failed");
        self.emit(SessionEvent::Error {
            message: err.to_string(),
        });
        self.last_error = Some(err.clone());
        Err(err)
    }

    fn emit(&mut self, event: SessionEvent) {
        if self.observers.is_empty() {
            return;
        }
        self.observers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("observer queue full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl<B: AudioBackend, W: WallClock> Drop for PlaybackSession<B, W> {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wall_clock::ManualWallClock;
    use ws_engine::{AudioClock, ClockHandle, Engine, NoteTrigger, VoiceOutput};
    use ws_ir::{NoteEvent, Track};

    const RATE: u32 = 1000;
    /// Frames per simulated display frame (10ms at RATE)
    const FRAME: usize = 10;

    type TestSession = PlaybackSession<Engine, ManualWallClock>;

    fn score() -> Arc<Score> {
        let lead = (0..10).map(|i| NoteEvent::new(60 + i as u8, i as f64, 0.5, 0.8)).collect();
        let bass = vec![NoteEvent::new(36, 0.0, 4.0, 1.0), NoteEvent::new(38, 4.0, 4.0, 1.0)];
        Arc::new(
            Score::new(vec![Track::new("lead", lead), Track::new("bass", bass)], 120.0, 480)
                .unwrap()
                .with_duration(10.0)
                .unwrap(),
        )
    }

    fn session() -> (TestSession, ManualWallClock) {
        let wall = ManualWallClock::new();
        let mut session =
            PlaybackSession::with_wall_clock(Engine::new(RATE), wall.clone(), SessionConfig::default())
                .unwrap();
        session.initialize().unwrap();
        (session, wall)
    }

    /// Render and tick for `seconds` of wall time, one display frame at a time.
    fn run(session: &mut TestSession, wall: &ManualWallClock, seconds: f64) {
        let frames = (seconds * RATE as f64).round() as usize / FRAME;
        for _ in 0..frames {
            session.backend_mut().render_frames(FRAME);
            wall.advance(FRAME as f64 / RATE as f64);
            session.tick();
        }
    }

    fn play(session: &mut TestSession, score: &Arc<Score>) {
        session.play(score.clone(), &TrackSet::new(), &[]).unwrap();
    }

    #[test]
    fn play_requires_initialized_backend() {
        let mut session = PlaybackSession::with_wall_clock(
            Engine::new(RATE),
            ManualWallClock::new(),
            SessionConfig::default(),
        )
        .unwrap();
        let err = session.play(score(), &TrackSet::new(), &[]).unwrap_err();
        assert!(matches!(err, SessionError::Engine(EngineError::ClockUnavailable(_))));
        assert_eq!(session.phase(), PlaybackPhase::Stopped);
        assert!(session.last_error().is_some());

        session.initialize().unwrap();
        session.initialize().unwrap();
        session.play(score(), &TrackSet::new(), &[]).unwrap();
        assert_eq!(session.phase(), PlaybackPhase::Playing);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn position_follows_clock_times_speed() {
        let (mut session, wall) = session();
        let score = score();
        session.set_speed(0.5).unwrap();
        play(&mut session, &score);
        run(&mut session, &wall, 2.0);
        assert!((session.position() - 1.0).abs() < 0.02);
    }

    #[test]
    fn pause_then_play_resumes_in_place() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        run(&mut session, &wall, 1.5);
        session.pause();
        let paused_at = session.position();
        assert_eq!(session.phase(), PlaybackPhase::Paused);
        assert!(session.has_live_batch());

        run(&mut session, &wall, 1.0);
        assert_eq!(session.position(), paused_at);

        play(&mut session, &score);
        assert!((session.position() - paused_at).abs() < 1e-9);
    }

    #[test]
    fn stop_twice_leaves_identical_state() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        run(&mut session, &wall, 0.5);
        session.stop();
        let first = session.snapshot();
        session.stop();
        assert_eq!(session.snapshot(), first);
        assert_eq!(first.phase, PlaybackPhase::Stopped);
        assert_eq!(first.musical_position, 0.0);
        assert!(!session.has_live_batch());
        assert_eq!(session.backend().sounding_count(), 0);
    }

    #[test]
    fn seek_round_trips_in_every_phase() {
        let (mut session, wall) = session();
        let score = score();

        session.seek_to(3.25).unwrap();
        assert_eq!(session.position(), 3.25);

        play(&mut session, &score);
        session.seek_to(6.5).unwrap();
        assert!((session.position() - 6.5).abs() < 1e-9);

        run(&mut session, &wall, 0.2);
        session.pause();
        session.seek_to(1.0).unwrap();
        assert_eq!(session.position(), 1.0);
    }

    #[test]
    fn seek_is_clamped_to_score() {
        let (mut session, _wall) = session();
        let score = score();
        play(&mut session, &score);
        session.pause();
        session.seek_to(-4.0).unwrap();
        assert_eq!(session.position(), 0.0);
        session.seek_to(99.0).unwrap();
        assert_eq!(session.position(), 10.0);
        assert!(session.seek_to(f64::NAN).is_err());
    }

    #[test]
    fn invalid_speed_keeps_previous() {
        let (mut session, _wall) = session();
        session.set_speed(1.25).unwrap();
        for bad in [0.0, -1.0, 0.05, 9.0, f64::NAN] {
            assert!(matches!(
                session.set_speed(bad),
                Err(SessionError::Config(ConfigError::UnsupportedSpeed(_)))
            ));
        }
        assert_eq!(session.speed(), 1.25);
        assert!(session.snapshot().last_error.is_some());
    }

    #[test]
    fn speed_change_while_playing_keeps_position_continuous() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        run(&mut session, &wall, 2.0);
        let before = session.position();
        session.set_speed(2.0).unwrap();
        assert!((session.position() - before).abs() < 1e-9);
        assert!(session.has_live_batch());

        run(&mut session, &wall, 1.0);
        assert!((session.position() - (before + 2.0)).abs() < 0.03);
    }

    #[test]
    fn play_while_playing_is_ignored() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        run(&mut session, &wall, 1.0);
        let before = session.position();
        play(&mut session, &score);
        assert!((session.position() - before).abs() < 1e-9);
    }

    #[test]
    fn score_end_stops() {
        let (mut session, wall) = session();
        let score = score();
        session.seek_to(9.8).unwrap();
        play(&mut session, &score);
        run(&mut session, &wall, 0.5);
        assert_eq!(session.phase(), PlaybackPhase::Stopped);
        assert_eq!(session.position(), 0.0);
        assert!(!session.has_live_batch());
    }

    #[test]
    fn play_at_end_restarts_from_zero() {
        let (mut session, _wall) = session();
        let score = score();
        play(&mut session, &score);
        session.pause();
        session.seek_to(10.0).unwrap();
        play(&mut session, &score);
        assert!(session.position() < 1e-9);
    }

    #[test]
    fn loop_start_wins_over_resume_position() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        run(&mut session, &wall, 1.0);
        session.pause();
        session.set_loop_start(Some(5.0)).unwrap();
        session.set_loop_end(Some(7.0)).unwrap();
        play(&mut session, &score);
        assert!((session.position() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn enabling_loop_while_playing_relocates() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        run(&mut session, &wall, 1.0);
        session.set_loop_end(Some(8.0)).unwrap();
        assert!((session.position() - 1.0).abs() < 0.02);
        session.set_loop_start(Some(6.0)).unwrap();
        assert!(session.loop_region().is_enabled());
        assert!((session.position() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn toggle_loop_without_bounds_fails() {
        let (mut session, _wall) = session();
        assert!(matches!(
            session.toggle_loop(),
            Err(SessionError::Config(ConfigError::LoopBoundsMissing))
        ));
    }

    #[test]
    fn loop_bounds_are_clamped_to_duration() {
        let (mut session, _wall) = session();
        let score = score();
        session.set_loop_start(Some(8.0)).unwrap();
        session.set_loop_end(Some(30.0)).unwrap();
        play(&mut session, &score);
        assert_eq!(session.loop_region().bounds(), Some((8.0, 10.0)));
    }

    #[test]
    fn clear_loop_forgets_bounds_and_keeps_playing() {
        let (mut session, wall) = session();
        let score = score();
        session.set_loop_start(Some(2.0)).unwrap();
        session.set_loop_end(Some(4.0)).unwrap();
        play(&mut session, &score);
        run(&mut session, &wall, 1.0);
        let events = session.subscribe();

        session.clear_loop();
        assert_eq!(session.loop_region().bounds(), None);
        assert!(!session.loop_region().is_enabled());
        assert!(events
            .try_iter()
            .any(|e| matches!(e, SessionEvent::LoopChanged { .. })));

        run(&mut session, &wall, 2.0);
        assert_eq!(session.phase(), PlaybackPhase::Playing);
        assert!(session.position() > 4.5);
    }

    #[test]
    fn pause_during_count_in_lands_paused() {
        let (mut session, wall) = session();
        let score = score();
        session.toggle_count_in();
        session.set_count_in_duration(3.0).unwrap();
        session.seek_to(2.0).unwrap();
        play(&mut session, &score);
        assert_eq!(session.phase(), PlaybackPhase::CountingIn);
        run(&mut session, &wall, 1.0);
        session.pause();
        assert_eq!(session.phase(), PlaybackPhase::Paused);
        assert_eq!(session.position(), 2.0);

        run(&mut session, &wall, 5.0);
        assert_eq!(session.phase(), PlaybackPhase::Paused);
        assert!(!session.backend().is_running());
    }

    #[test]
    fn stop_cancels_count_in() {
        let (mut session, wall) = session();
        let score = score();
        session.toggle_count_in();
        play(&mut session, &score);
        session.stop();
        run(&mut session, &wall, 5.0);
        assert_eq!(session.phase(), PlaybackPhase::Stopped);
    }

    #[test]
    fn stale_frame_task_is_discarded() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        let old = session.frame_task().unwrap();
        session.pause();
        assert_eq!(session.frame_task(), None);
        assert!(!session.run_frame(old));

        play(&mut session, &score);
        run(&mut session, &wall, 0.1);
        assert!(!session.run_frame(old));
        let current = session.frame_task().unwrap();
        assert!(session.run_frame(current));
    }

    #[test]
    fn track_volume_validation() {
        let (mut session, _wall) = session();
        let score = score();
        assert!(matches!(
            session.set_track_volume(0, 50),
            Err(SessionError::Config(ConfigError::UnknownTrack { .. }))
        ));
        play(&mut session, &score);
        session.set_track_volume(1, 40).unwrap();
        assert_eq!(session.track_volumes(), &[100, 40]);
        assert_eq!(session.backend().track_gains().volume(1), 40);
        assert!(session.set_track_volume(1, 101).is_err());
        assert!(session.set_track_volume(2, 10).is_err());
        assert_eq!(session.track_volumes(), &[100, 40]);
    }

    #[test]
    fn play_rejects_out_of_range_volume() {
        let (mut session, _wall) = session();
        let err = session.play(score(), &TrackSet::new(), &[100, 150]).unwrap_err();
        assert_eq!(err, SessionError::Config(ConfigError::VolumeOutOfRange(150)));
        assert_eq!(session.phase(), PlaybackPhase::Stopped);
    }

    #[test]
    fn solo_overrides_mutes() {
        let (mut session, _wall) = session();
        let score = score();
        play(&mut session, &score);
        session.set_solo(Some(1)).unwrap();
        assert_eq!(session.muted_tracks(), &TrackSet::from([0]));
        assert!(session.backend().track_gains().is_muted(0));

        session.set_solo(None).unwrap();
        assert!(session.muted_tracks().is_empty());
        assert!(!session.backend().track_gains().is_muted(0));
    }

    #[test]
    fn active_notes_track_position() {
        let (mut session, wall) = session();
        let score = score();
        play(&mut session, &score);
        run(&mut session, &wall, 0.2);
        let pitches: Vec<u8> = session.active_notes().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 36]);

        session.set_track_muted(1, true).unwrap();
        run(&mut session, &wall, 0.1);
        let pitches: Vec<u8> = session.active_notes().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60]);
    }

    #[test]
    fn trainer_enable_sets_start_speed_in_any_phase() {
        let (mut session, _wall) = session();
        session
            .set_speed_trainer_config(TrainerPatch {
                start_speed: Some(0.7),
                end_speed: Some(1.2),
                increment: Some(0.1),
                ..TrainerPatch::default()
            })
            .unwrap();
        assert_eq!(session.speed(), 1.0);
        session.toggle_speed_trainer();
        assert_eq!(session.speed(), 0.7);

        session.set_speed(0.9).unwrap();
        session.toggle_speed_trainer();
        assert_eq!(session.speed(), 0.9);
    }

    #[test]
    fn observers_receive_phase_changes() {
        let (mut session, _wall) = session();
        let events = session.subscribe();
        let score = score();
        play(&mut session, &score);
        session.stop();

        let phases: Vec<_> = events
            .try_iter()
            .filter_map(|e| match e {
                SessionEvent::PhaseChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec![PlaybackPhase::Playing, PlaybackPhase::Stopped]);
    }

    #[test]
    fn dropped_observer_is_removed() {
        let (mut session, _wall) = session();
        drop(session.subscribe());
        let kept = session.subscribe();
        session.seek_to(1.0).unwrap();
        assert_eq!(session.observers.len(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn snapshot_serializes() {
        let (mut session, _wall) = session();
        let score = score();
        play(&mut session, &score);
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["phase"], "playing");
        assert_eq!(json["duration"], 10.0);
        assert_eq!(json["track_volumes"], serde_json::json!([100, 100]));
    }

    #[test]
    fn voices_are_sized_for_slowest_speed() {
        let (mut session, _wall) = session();
        let score = score();
        play(&mut session, &score);
        assert!(session.backend().voices().capacity() >= SessionConfig::default().min_voices_per_track);
        assert_eq!(session.backend().voices().track_count(), 2);
    }

    #[test]
    fn gains_cover_every_track_of_a_wide_score() {
        let (mut session, _wall) = session();
        let tracks = (0..130)
            .map(|i| Track::new(&format!("t{i}"), vec![NoteEvent::new(60, 0.0, 1.0, 0.8)]))
            .collect();
        let score = Arc::new(Score::new(tracks, 120.0, 480).unwrap());
        play(&mut session, &score);

        session.set_track_muted(129, true).unwrap();
        session.set_track_volume(128, 0).unwrap();
        let gains = session.backend().track_gains();
        assert!(gains.is_muted(129));
        assert_eq!(gains.gain(129), 0.0);
        assert_eq!(gains.volume(128), 0);
        assert_eq!(gains.gain(127), 1.0);
    }

    #[test]
    fn voice_stealing_is_reported_once_per_interval() {
        let (mut session, wall) = session();
        let cluster = (0..80).map(|i| NoteEvent::new(30 + i as u8, 0.0, 1.0, 0.5)).collect();
        let score = Arc::new(Score::new(vec![Track::new("cluster", cluster)], 120.0, 480).unwrap());
        let events = session.subscribe();
        play(&mut session, &score);
        run(&mut session, &wall, 0.5);

        let stolen: Vec<u64> = events
            .try_iter()
            .filter_map(|e| match e {
                SessionEvent::VoicesStolen { count } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(stolen, vec![16]);
        assert_eq!(session.backend().steal_count(), 16);
    }

    /// Renders a few frames ahead of every clock reposition, the way the
    /// audio thread can take the engine lock between two backend calls.
    struct Contended(Engine);

    impl AudioClock for Contended {
        fn now(&self) -> f64 {
            self.0.now()
        }

        fn is_running(&self) -> bool {
            self.0.is_running()
        }

        fn schedule(&mut self, at: f64, trigger: NoteTrigger) -> ClockHandle {
            self.0.schedule(at, trigger)
        }

        fn schedule_many(&mut self, events: &[(f64, NoteTrigger)]) -> Vec<ClockHandle> {
            self.0.schedule_many(events)
        }

        fn cancel(&mut self, handle: ClockHandle) -> bool {
            self.0.cancel(handle)
        }

        fn cancel_many(&mut self, handles: &[ClockHandle]) -> usize {
            self.0.cancel_many(handles)
        }

        fn start(&mut self, origin: f64) {
            if self.0.is_running() {
                self.0.render_frames(6);
            }
            self.0.start(origin);
        }

        fn pause(&mut self) {
            self.0.pause();
        }

        fn stop(&mut self) {
            self.0.stop();
        }
    }

    impl VoiceOutput for Contended {
        fn allocate(&mut self, track_count: usize, voices_per_track: usize) {
            self.0.allocate(track_count, voices_per_track);
        }

        fn trigger(&mut self, trigger: NoteTrigger) {
            self.0.trigger(trigger);
        }

        fn set_volume(&self, track: usize, volume: u8) {
            self.0.set_volume(track, volume);
        }

        fn set_muted(&self, track: usize, muted: bool) {
            self.0.set_muted(track, muted);
        }

        fn silence_all(&mut self) {
            self.0.silence_all();
        }

        fn click(&mut self, accent: bool) {
            self.0.click(accent);
        }

        fn sounding_count(&self) -> usize {
            self.0.sounding_count()
        }

        fn steal_count(&self) -> u64 {
            self.0.steal_count()
        }
    }

    impl AudioBackend for Contended {
        fn initialize(&mut self) -> Result<(), EngineError> {
            self.0.initialize()
        }

        fn is_initialized(&self) -> bool {
            self.0.is_initialized()
        }

        fn reschedule(
            &mut self,
            stale: &[ClockHandle],
            events: &[(f64, NoteTrigger)],
            origin: f64,
        ) -> Vec<ClockHandle> {
            self.0.reschedule(stale, events, origin)
        }
    }

    #[test]
    fn speed_change_never_renders_the_new_batch_at_the_old_origin() {
        let wall = ManualWallClock::new();
        let mut session = PlaybackSession::with_wall_clock(
            Contended(Engine::new(RATE)),
            wall.clone(),
            SessionConfig::default(),
        )
        .unwrap();
        session.initialize().unwrap();
        let score = Arc::new(
            Score::new(vec![Track::new("lead", vec![NoteEvent::new(60, 4.0, 0.5, 0.8)])], 120.0, 480)
                .unwrap()
                .with_duration(20.0)
                .unwrap(),
        );
        session.set_speed(2.0).unwrap();
        session.play(score, &TrackSet::new(), &[]).unwrap();
        for _ in 0..400 {
            session.backend_mut().0.render_frames(FRAME);
            wall.advance(FRAME as f64 / RATE as f64);
            session.tick();
        }
        assert!((session.position() - 8.0).abs() < 1e-9);
        assert_eq!(session.backend().sounding_count(), 0);

        // At speed 1 the note sits at clock 4.0, where the old clock stands
        session.set_speed(1.0).unwrap();
        assert!((session.position() - 8.0).abs() < 1e-9);
        assert_eq!(session.backend().sounding_count(), 0);
        session.backend_mut().0.render_frames(FRAME);
        assert_eq!(session.backend().sounding_count(), 0);
    }
}
