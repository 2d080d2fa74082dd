//! Practice playback session for woodshed.
//!
//! [`PlaybackSession`] is the single owner of playback state: transport,
//! speed, the A-B practice loop, count-in, the speed trainer and per-track
//! mixing. It drives any [`ws_engine::AudioBackend`]; [`LiveBackend`] plays
//! through the sound card and [`OfflineRenderer`] runs a session faster than
//! real time for export and tests.

mod config;
mod count_in;
mod error;
mod live;
mod loop_region;
mod publisher;
mod render;
mod session;
mod trainer;
mod wall_clock;

pub use config::SessionConfig;
pub use count_in::{CountIn, CountInSettings, CountInStep, MAX_COUNT_IN_SECONDS};
pub use error::{ConfigError, SessionError};
pub use live::LiveBackend;
pub use loop_region::{LoopChange, LoopRegion};
pub use publisher::{classify, ActiveNote, ClockPublisher, FrameSignal, FrameTask};
pub use render::{OfflineRenderer, OfflineSession};
pub use session::{PlaybackPhase, PlaybackSession, PlaybackSnapshot, SessionEvent};
pub use trainer::{SpeedTrainer, TrainerPatch};
pub use wall_clock::{ManualWallClock, SystemWallClock, WallClock};
