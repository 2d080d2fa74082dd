//! Audio frame type.

/// A stereo audio frame (32-bit float, nominal range -1.0..=1.0).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0.0, right: 0.0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: f32) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Sum another frame into this one.
    pub fn mix(&mut self, other: Frame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Scale both channels by a linear gain.
    pub fn apply_gain(&mut self, gain: f32) {
        self.left *= gain;
        self.right *= gain;
    }

    pub fn is_silent(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    /// Clamp to the valid range and convert to 16-bit PCM.
    pub fn to_i16(self) -> (i16, i16) {
        let convert = |v: f32| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        (convert(self.left), convert(self.right))
    }
}
