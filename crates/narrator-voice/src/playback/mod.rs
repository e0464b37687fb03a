//! Playback transport: the engine plus the audio output it drives.

mod engine;
mod output;
mod rodio_output;

pub use engine::{
    MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE, PlaybackConfig, PlaybackEngine, PlaybackEngineBuilder,
};
pub use output::{AudioOutput, EndedCallback, OutputClock, OutputFactory};
pub use rodio_output::RodioOutput;
