//! Audio sinks for woodshed: the default sound device via cpal, and 16-bit
//! WAV files via hound.

mod cpal_backend;
mod traits;
mod wav;

pub use cpal_backend::CpalOutput;
pub use traits::{AudioError, AudioOutput};
pub use wav::{frames_to_wav, WavOutput};
