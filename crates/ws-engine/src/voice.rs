//! Voice: a single synthesized note.

use core::f32::consts::TAU;
use ws_ir::pitch_to_frequency;

/// Attack ramp length.
pub const ATTACK_SECONDS: f64 = 0.004;

/// Release tail length after the hold time ends.
pub const RELEASE_SECONDS: f64 = 0.08;

/// Per-voice output scale, leaves headroom for chords.
const VOICE_HEADROOM: f32 = 0.2;

/// Voice lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Note held; envelope attacking or sustaining.
    #[default]
    Active,
    /// Hold time elapsed; envelope releasing.
    Released,
}

/// A single voice producing a decaying two-partial tone.
#[derive(Clone, Debug)]
pub struct Voice {
    pub pitch: u8,
    pub velocity: f32,
    /// Oscillator phase (0.0..1.0)
    phase: f32,
    /// Phase increment per frame
    increment: f32,
    /// Frames left before release starts
    hold_frames: u32,
    /// Envelope level (0.0..=1.0)
    level: f32,
    attack_step: f32,
    release_step: f32,
    /// Frames rendered so far, used to pick steal victims
    pub age: u64,
    pub state: VoiceState,
    /// Is the voice currently producing audio?
    pub playing: bool,
}

impl Voice {
    /// Create a voice that holds `pitch` for `duration_seconds`, then releases.
    pub fn new(pitch: u8, velocity: f32, duration_seconds: f64, sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as f64;
        let frames = |secs: f64| (secs * rate).round().max(1.0);
        Self {
            pitch,
            velocity: velocity.clamp(0.0, 1.0),
            phase: 0.0,
            increment: pitch_to_frequency(pitch) / rate as f32,
            hold_frames: frames(duration_seconds) as u32,
            level: 0.0,
            attack_step: (1.0 / frames(ATTACK_SECONDS)) as f32,
            release_step: (1.0 / frames(RELEASE_SECONDS)) as f32,
            age: 0,
            state: VoiceState::Active,
            playing: true,
        }
    }

    /// Render one mono sample and advance.
    pub fn render(&mut self) -> f32 {
        if !self.playing {
            return 0.0;
        }

        match self.state {
            VoiceState::Active => {
                self.level = (self.level + self.attack_step).min(1.0);
                self.hold_frames = self.hold_frames.saturating_sub(1);
                if self.hold_frames == 0 {
                    self.state = VoiceState::Released;
                }
            }
            VoiceState::Released => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.playing = false;
                    return 0.0;
                }
            }
        }

        let angle = self.phase * TAU;
        let tone = angle.sin() + 0.3 * (2.0 * angle).sin();
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.age += 1;

        tone * self.level * self.velocity * VOICE_HEADROOM
    }

    /// Start the release tail now.
    pub fn release(&mut self) {
        self.state = VoiceState::Released;
    }

    /// Current envelope level.
    pub fn level(&self) -> f32 {
        self.level
    }
}

/// A short decaying sine burst for metronome clicks.
#[derive(Clone, Debug)]
pub struct ClickVoice {
    phase: f32,
    increment: f32,
    remaining: u32,
    total: u32,
}

/// Click length.
const CLICK_SECONDS: f64 = 0.03;

impl ClickVoice {
    pub fn new(accent: bool, sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as f64;
        let freq = if accent { 1600.0 } else { 1000.0 };
        let total = ((CLICK_SECONDS * rate).round() as u32).max(1);
        Self {
            phase: 0.0,
            increment: (freq / rate) as f32,
            remaining: total,
            total,
        }
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }

    pub fn render(&mut self) -> f32 {
        if self.remaining == 0 {
            return 0.0;
        }
        let env = self.remaining as f32 / self.total as f32;
        let out = (self.phase * TAU).sin() * env * 0.5;
        self.phase = (self.phase + self.increment).fract();
        self.remaining -= 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    fn render_n(voice: &mut Voice, n: usize) -> Vec<f32> {
        (0..n).map(|_| voice.render()).collect()
    }

    #[test]
    fn voice_produces_sound() {
        let mut voice = Voice::new(69, 1.0, 0.1, RATE);
        let out = render_n(&mut voice, 200);
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn voice_releases_after_hold() {
        let mut voice = Voice::new(60, 1.0, 0.01, RATE);
        render_n(&mut voice, 80);
        assert_eq!(voice.state, VoiceState::Released);
        assert!(voice.playing);
    }

    #[test]
    fn voice_stops_after_release_tail() {
        let mut voice = Voice::new(60, 1.0, 0.01, RATE);
        let total = ((0.01 + RELEASE_SECONDS + 0.01) * RATE as f64) as usize;
        render_n(&mut voice, total);
        assert!(!voice.playing);
        assert_eq!(voice.render(), 0.0);
    }

    #[test]
    fn zero_velocity_is_silent() {
        let mut voice = Voice::new(60, 0.0, 0.1, RATE);
        assert!(render_n(&mut voice, 200).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn output_is_bounded() {
        let mut voice = Voice::new(100, 1.0, 0.5, RATE);
        assert!(render_n(&mut voice, 4000).iter().all(|s| s.abs() <= VOICE_HEADROOM * 1.3 + 1e-6));
    }

    #[test]
    fn click_is_short() {
        let mut click = ClickVoice::new(true, RATE);
        let len = (CLICK_SECONDS * RATE as f64).round() as usize;
        for _ in 0..len {
            click.render();
        }
        assert!(click.is_done());
        assert_eq!(click.render(), 0.0);
    }
}
