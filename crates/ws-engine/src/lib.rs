//! Playback engine for woodshed.
//!
//! Holds the audio clock timeline that note triggers are scheduled on, the
//! per-track voice pool, and an [`Engine`] that renders both into frames.

mod backend;
mod clock;
mod event_queue;
mod frame;
mod mixer;
pub mod scheduler;
mod transport;
mod voice;
mod voice_pool;

pub use backend::{AudioBackend, EngineError};
pub use clock::{AudioClock, ClockHandle, NoteTrigger};
pub use event_queue::EventQueue;
pub use frame::Frame;
pub use mixer::Engine;
pub use scheduler::{required_polyphony, schedule_score, ScheduledBatch, MIN_AUDIBLE_DURATION};
pub use transport::TransportClock;
pub use voice::{Voice, VoiceState, RELEASE_SECONDS};
pub use voice_pool::{TrackGains, VoiceOutput, VoicePool, MAX_VOICES_PER_TRACK};
