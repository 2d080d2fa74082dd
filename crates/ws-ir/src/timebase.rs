//! Conversions between musical time and clock time.
//!
//! Musical time is the score's own seconds, independent of playback speed.
//! Clock time is what the audio clock counts. While playing,
//! `musical = clock * speed`.

/// Slowest accepted playback speed.
pub const MIN_SPEED: f64 = 0.1;

/// Fastest accepted playback speed.
pub const MAX_SPEED: f64 = 4.0;

/// Speeds are quantized to this many steps per 1.0.
const SPEED_STEPS: f64 = 1000.0;

/// Convert a musical position to clock seconds at `speed`.
pub fn musical_to_clock(musical: f64, speed: f64) -> f64 {
    musical / speed
}

/// Convert clock seconds to a musical position at `speed`.
pub fn clock_to_musical(clock: f64, speed: f64) -> f64 {
    clock * speed
}

/// Round a speed to the nearest thousandth.
///
/// Repeated trainer increments accumulate float error (0.5 + 5 × 0.1 is not
/// 1.0 in binary), so every stored speed goes through here.
pub fn quantize_speed(speed: f64) -> f64 {
    libm::round(speed * SPEED_STEPS) / SPEED_STEPS
}

/// Whether `speed` is finite and within the supported range.
pub fn is_supported_speed(speed: f64) -> bool {
    speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_and_musical_are_inverse() {
        for speed in [0.25, 0.5, 1.0, 1.37, 2.0] {
            let clock = musical_to_clock(7.5, speed);
            assert!((clock_to_musical(clock, speed) - 7.5).abs() < 1e-12);
        }
    }

    #[test]
    fn half_speed_doubles_clock_time() {
        assert_eq!(musical_to_clock(4.0, 0.5), 8.0);
    }

    #[test]
    fn quantize_absorbs_increment_drift() {
        let mut speed = 0.5;
        for _ in 0..5 {
            speed = quantize_speed(speed + 0.1);
        }
        assert_eq!(speed, 1.0);
    }

    #[test]
    fn supported_range() {
        assert!(is_supported_speed(1.0));
        assert!(is_supported_speed(MIN_SPEED));
        assert!(is_supported_speed(MAX_SPEED));
        assert!(!is_supported_speed(0.0));
        assert!(!is_supported_speed(-1.0));
        assert!(!is_supported_speed(f64::NAN));
        assert!(!is_supported_speed(f64::INFINITY));
    }
}
