//! MIDI pitch to frequency conversion.

/// MIDI note number of A4.
const A4_PITCH: f32 = 69.0;

/// Concert pitch in Hz.
const A4_HZ: f32 = 440.0;

/// Equal-tempered frequency of a MIDI pitch.
///
/// Pitch 69 = 440 Hz, pitch 60 (middle C) ≈ 261.63 Hz.
pub fn pitch_to_frequency(pitch: u8) -> f32 {
    A4_HZ * libm::powf(2.0, (pitch as f32 - A4_PITCH) / 12.0)
}
