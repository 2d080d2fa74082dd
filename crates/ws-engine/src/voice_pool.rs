//! VoicePool: per-track voice allocation, gain and lifecycle management.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use heapless::Vec as FixedVec;
use tracing::{debug, warn};

use crate::clock::NoteTrigger;
use crate::frame::Frame;
use crate::voice::{ClickVoice, Voice, VoiceState};

/// Upper bound on simultaneous voices per track.
pub const MAX_VOICES_PER_TRACK: usize = 64;

/// Simultaneous count-in clicks.
const MAX_CLICKS: usize = 4;

/// Full-scale track volume.
const FULL_VOLUME: u8 = 100;

/// The voice-pool contract the playback session drives.
pub trait VoiceOutput {
    /// (Re)create independent voices for `track_count` tracks, disposing prior ones.
    fn allocate(&mut self, track_count: usize, voices_per_track: usize);

    /// Sound a note now on its track.
    fn trigger(&mut self, trigger: NoteTrigger);

    /// Set a track's volume (0-100). Takes effect on the next rendered frame.
    fn set_volume(&self, track: usize, volume: u8);

    /// Mute or unmute a track. Reversible; does not touch sounding voices.
    fn set_muted(&self, track: usize, muted: bool);

    /// Force-stop every sounding voice and click.
    fn silence_all(&mut self);

    /// Sound a metronome click, independent of track gains.
    fn click(&mut self, accent: bool);

    /// Voices and clicks currently producing audio.
    fn sounding_count(&self) -> usize;

    /// Triggers so far that had to steal a sounding voice.
    fn steal_count(&self) -> u64;
}

/// Lock-free per-track volume and mute flags shared with the renderer.
///
/// One entry per track, sized when the voice pool is allocated.
#[derive(Debug, Default)]
pub struct TrackGains {
    volumes: Box<[AtomicU8]>,
    muted: Box<[AtomicBool]>,
}

impl TrackGains {
    pub fn new(track_count: usize) -> Self {
        Self {
            volumes: (0..track_count).map(|_| AtomicU8::new(FULL_VOLUME)).collect(),
            muted: (0..track_count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn set_volume(&self, track: usize, volume: u8) {
        match self.volumes.get(track) {
            Some(v) => v.store(volume.min(FULL_VOLUME), Ordering::Relaxed),
            None => warn!(track, "volume change ignored: track outside gain table"),
        }
    }

    pub fn set_muted(&self, track: usize, muted: bool) {
        match self.muted.get(track) {
            Some(m) => m.store(muted, Ordering::Relaxed),
            None => warn!(track, "mute change ignored: track outside gain table"),
        }
    }

    pub fn volume(&self, track: usize) -> u8 {
        self.volumes
            .get(track)
            .map_or(FULL_VOLUME, |v| v.load(Ordering::Relaxed))
    }

    pub fn is_muted(&self, track: usize) -> bool {
        self.muted
            .get(track)
            .is_some_and(|m| m.load(Ordering::Relaxed))
    }

    /// Linear gain: 0.0 when muted, otherwise volume / 100.
    pub fn gain(&self, track: usize) -> f32 {
        if self.is_muted(track) {
            0.0
        } else {
            self.volume(track) as f32 / FULL_VOLUME as f32
        }
    }
}

/// Polyphonic voices for one track.
#[derive(Clone, Debug, Default)]
struct TrackVoices {
    /// Voice slots (None = free).
    slots: Vec<Option<Voice>>,
}

impl TrackVoices {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Place a voice in a free slot, or steal one. Returns true if a voice was stolen.
    fn place(&mut self, voice: Voice) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(voice);
            return false;
        }
        match self.find_steal_candidate() {
            Some(id) => {
                self.slots[id] = Some(voice);
                true
            }
            None => false,
        }
    }

    /// Best slot to steal: released before active, then the quietest / oldest.
    fn find_steal_candidate(&self) -> Option<usize> {
        let priority = |v: &Voice| match v.state {
            VoiceState::Released => 0,
            VoiceState::Active => 1,
        };
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
            .min_by(|(_, a), (_, b)| {
                priority(a)
                    .cmp(&priority(b))
                    .then(a.level().total_cmp(&b.level()))
                    .then(b.age.cmp(&a.age))
            })
            .map(|(i, _)| i)
    }

    fn render(&mut self) -> f32 {
        let mut sum = 0.0;
        for slot in &mut self.slots {
            if let Some(voice) = slot {
                sum += voice.render();
                if !voice.playing {
                    *slot = None;
                }
            }
        }
        sum
    }

    fn sounding(&self) -> usize {
        self.slots.iter().flatten().filter(|v| v.playing).count()
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

/// Per-track pools of voices plus the count-in click voices.
pub struct VoicePool {
    sample_rate: u32,
    tracks: Vec<TrackVoices>,
    clicks: FixedVec<ClickVoice, MAX_CLICKS>,
    gains: Arc<TrackGains>,
    /// Notes that had to steal a sounding voice.
    steals: u64,
}

impl VoicePool {
    /// Create a new empty voice pool.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            tracks: Vec::new(),
            clicks: FixedVec::new(),
            gains: Arc::new(TrackGains::default()),
            steals: 0,
        }
    }

    /// Shared gain table, for lock-free volume/mute control from other threads.
    ///
    /// [`allocate`](VoiceOutput::allocate) replaces the table, so holders must
    /// fetch it again after every allocation.
    pub fn gains(&self) -> Arc<TrackGains> {
        self.gains.clone()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Voice slots per track.
    pub fn capacity(&self) -> usize {
        self.tracks.first().map_or(0, |t| t.slots.len())
    }

    /// Voices currently producing audio on one track.
    pub fn sounding_on(&self, track: usize) -> usize {
        self.tracks.get(track).map_or(0, TrackVoices::sounding)
    }

    /// Render all voices into one frame (allocation-free).
    pub fn render(&mut self) -> Frame {
        let mut out = 0.0;
        for (index, track) in self.tracks.iter_mut().enumerate() {
            let sample = track.render();
            out += sample * self.gains.gain(index);
        }
        for click in self.clicks.iter_mut() {
            out += click.render();
        }
        self.clicks.retain(|c| !c.is_done());
        Frame::mono(out)
    }
}

impl VoiceOutput for VoicePool {
    fn allocate(&mut self, track_count: usize, voices_per_track: usize) {
        let capacity = voices_per_track.clamp(1, MAX_VOICES_PER_TRACK);
        self.tracks = (0..track_count)
            .map(|_| TrackVoices::with_capacity(capacity))
            .collect();
        self.gains = Arc::new(TrackGains::new(track_count));
        debug!(track_count, capacity, "voice pool allocated");
    }

    fn trigger(&mut self, trigger: NoteTrigger) {
        let Some(track) = self.tracks.get_mut(trigger.track) else {
            return;
        };
        let voice = Voice::new(
            trigger.pitch,
            trigger.velocity,
            trigger.duration_seconds,
            self.sample_rate,
        );
        if track.place(voice) {
            self.steals += 1;
        }
    }

    fn set_volume(&self, track: usize, volume: u8) {
        self.gains.set_volume(track, volume);
    }

    fn set_muted(&self, track: usize, muted: bool) {
        self.gains.set_muted(track, muted);
    }

    fn silence_all(&mut self) {
        for track in &mut self.tracks {
            track.clear();
        }
        self.clicks.clear();
    }

    fn click(&mut self, accent: bool) {
        let click = ClickVoice::new(accent, self.sample_rate);
        if self.clicks.push(click.clone()).is_err() {
            self.clicks.remove(0);
            let _ = self.clicks.push(click);
        }
    }

    fn sounding_count(&self) -> usize {
        self.tracks.iter().map(TrackVoices::sounding).sum::<usize>() + self.clicks.len()
    }

    fn steal_count(&self) -> u64 {
        self.steals
    }
}
