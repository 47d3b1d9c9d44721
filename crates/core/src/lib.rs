pub mod config;
pub mod session;
pub mod time_pitch;

pub use config::{Config, ConfigError};
pub use session::Session;
pub use time_pitch::{FixedTimePitch, TimePitchUnit};

pub use scrub_decode::{decode_file, load_sound};
pub use scrub_engine::{EffectsStage, EngineConfig, FilterStage, Passthrough, RenderEndpoint};
pub use scrub_render::{render_blocks, render_playback, write_wav};
pub use scrub_transport::{ChannelMode, LoopRange, StereoBuffer, TransportState, pitch_ratio};
