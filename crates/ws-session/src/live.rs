//! Real-time backend: an audio thread renders the engine into a cpal stream.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error};
use ws_audio::{AudioOutput, CpalOutput};
use ws_engine::{
    AudioBackend, AudioClock, ClockHandle, Engine, EngineError, Frame, NoteTrigger, TrackGains,
    VoiceOutput,
};

/// Frames rendered per engine lock.
const BLOCK_FRAMES: usize = 256;

type Ready = Result<Arc<Mutex<Engine>>, String>;

fn lock(engine: &Mutex<Engine>) -> MutexGuard<'_, Engine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clock time of the frame now reaching the device: `now` less the audio
/// still queued, never earlier than the last reposition.
fn audible_time(now: f64, origin: f64, queued: usize, sample_rate: u32) -> f64 {
    let latency = queued as f64 / f64::from(sample_rate.max(1));
    (now - latency).max(origin.min(now))
}

/// An [`AudioBackend`] that plays through the default output device.
///
/// The engine lives behind a mutex shared with the audio thread; volume and
/// mute go straight to the lock-free gain table. [`now`](AudioClock::now)
/// reports what is audible, not what has been rendered.
pub struct LiveBackend {
    buffer_ms: u32,
    engine: Option<Arc<Mutex<Engine>>>,
    gains: Option<Arc<TrackGains>>,
    /// Frames waiting in the output ring after the last write
    queued: Arc<AtomicUsize>,
    stop_signal: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LiveBackend {
    pub fn new(buffer_ms: u32) -> Self {
        Self {
            buffer_ms,
            engine: None,
            gains: None,
            queued: Arc::new(AtomicUsize::new(0)),
            stop_signal: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.engine.as_ref().map(|e| lock(e).sample_rate())
    }

    fn with_engine<R>(&self, fallback: R, f: impl FnOnce(&mut Engine) -> R) -> R {
        match &self.engine {
            Some(engine) => f(&mut lock(engine)),
            None => fallback,
        }
    }
}

impl AudioClock for LiveBackend {
    fn now(&self) -> f64 {
        let queued = self.queued.load(Ordering::Relaxed);
        self.with_engine(0.0, |e| {
            audible_time(e.now(), e.clock().origin(), queued, e.sample_rate())
        })
    }

    fn is_running(&self) -> bool {
        self.with_engine(false, |e| e.is_running())
    }

    fn schedule(&mut self, at: f64, trigger: NoteTrigger) -> ClockHandle {
        self.with_engine(ClockHandle::default(), |e| e.schedule(at, trigger))
    }

    fn schedule_many(&mut self, events: &[(f64, NoteTrigger)]) -> Vec<ClockHandle> {
        self.with_engine(Vec::new(), |e| e.schedule_many(events))
    }

    fn cancel(&mut self, handle: ClockHandle) -> bool {
        self.with_engine(false, |e| e.cancel(handle))
    }

    fn cancel_many(&mut self, handles: &[ClockHandle]) -> usize {
        self.with_engine(0, |e| e.cancel_many(handles))
    }

    fn start(&mut self, origin: f64) {
        self.with_engine((), |e| e.start(origin));
    }

    fn pause(&mut self) {
        self.with_engine((), |e| e.pause());
    }

    fn stop(&mut self) {
        self.with_engine((), |e| e.stop());
    }
}

impl VoiceOutput for LiveBackend {
    fn allocate(&mut self, track_count: usize, voices_per_track: usize) {
        let gains = self.with_engine(None, |e| {
            e.allocate(track_count, voices_per_track);
            Some(e.track_gains())
        });
        if gains.is_some() {
            self.gains = gains;
        }
    }

    fn trigger(&mut self, trigger: NoteTrigger) {
        self.with_engine((), |e| e.trigger(trigger));
    }

    fn set_volume(&self, track: usize, volume: u8) {
        if let Some(gains) = &self.gains {
            gains.set_volume(track, volume);
        }
    }

    fn set_muted(&self, track: usize, muted: bool) {
        if let Some(gains) = &self.gains {
            gains.set_muted(track, muted);
        }
    }

    fn silence_all(&mut self) {
        self.with_engine((), |e| e.silence_all());
    }

    fn click(&mut self, accent: bool) {
        self.with_engine((), |e| e.click(accent));
    }

    fn sounding_count(&self) -> usize {
        self.with_engine(0, |e| e.sounding_count())
    }

    fn steal_count(&self) -> u64 {
        self.with_engine(0, |e| e.steal_count())
    }
}

impl AudioBackend for LiveBackend {
    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.engine.is_some() {
            return Ok(());
        }
        self.stop_signal.store(false, Ordering::Relaxed);

        let (ready_tx, ready_rx) = bounded::<Ready>(1);
        let stop = self.stop_signal.clone();
        let queued = self.queued.clone();
        let buffer_ms = self.buffer_ms;
        let thread = thread::Builder::new()
            .name("ws-audio".into())
            .spawn(move || audio_thread(buffer_ms, stop, queued, ready_tx))
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err("audio thread exited before starting".into()));
        match ready {
            Ok(engine) => {
                let mut guard = lock(&engine);
                guard.initialize()?;
                self.gains = Some(guard.track_gains());
                drop(guard);
                self.engine = Some(engine);
                self.thread = Some(thread);
                Ok(())
            }
            Err(message) => {
                let _ = thread.join();
                Err(EngineError::ClockUnavailable(message))
            }
        }
    }

    fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    fn reschedule(
        &mut self,
        stale: &[ClockHandle],
        events: &[(f64, NoteTrigger)],
        origin: f64,
    ) -> Vec<ClockHandle> {
        self.with_engine(Vec::new(), |e| e.reschedule(stale, events, origin))
    }
}

impl Drop for LiveBackend {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn audio_thread(
    buffer_ms: u32,
    stop_signal: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    ready: Sender<Ready>,
) {
    let (mut output, consumer) = match CpalOutput::new(buffer_ms) {
        Ok(pair) => pair,
        Err(err) => {
            let _ = ready.send(Err(err.to_string()));
            return;
        }
    };

    let engine = Arc::new(Mutex::new(Engine::new(output.sample_rate())));
    if let Err(err) = output.build_stream(consumer).and_then(|()| output.start()) {
        error!(%err, "failed to start audio stream");
        let _ = ready.send(Err(err.to_string()));
        return;
    }
    if ready.send(Ok(engine.clone())).is_err() {
        return;
    }

    let mut block = [Frame::silence(); BLOCK_FRAMES];
    while !stop_signal.load(Ordering::Relaxed) {
        lock(&engine).render_block(&mut block);
        output.write_blocking(&block, &stop_signal);
        queued.store(output.buffered(), Ordering::Relaxed);
    }
    queued.store(0, Ordering::Relaxed);

    if let Err(err) = output.stop() {
        error!(%err, "failed to stop audio stream");
    }
    debug!("audio thread exiting");
}
