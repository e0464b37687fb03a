//! Narration engine for the reader: a background speech-synthesis worker,
//! the service that mediates every request to it, and the playback
//! transport that turns synthesized audio into highlighted speech.
//!
//! ```text
//! ReadAloudSession ──▶ PlaybackEngine ──▶ SpeechSynthesizer (SynthesisService)
//!        │                   │                        │
//!  PageTextProvider     AudioOutput (rodio)     WorkerSpawner ──▶ narrator-synth thread
//! ```
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;

pub mod backend;
pub mod catalog;
pub mod error;
pub mod framing;
pub mod playback;
pub mod prompts;
pub mod session;
pub mod synthesis;
pub mod timing;
pub mod worker;

pub use catalog::{CatalogEntry, DEFAULT_VOICE, SAMPLE_RATE, VoiceCatalog};
pub use error::{AudioError, PlaybackError, SynthesisError};
pub use playback::{AudioOutput, PlaybackConfig, PlaybackEngine, RodioOutput};
pub use prompts::{AssetPromptSource, VoicePromptSource};
pub use session::{ReadAloudConfig, ReadAloudSession};
pub use synthesis::{SpeechResponse, SpeechSynthesizer, SynthesisConfig, SynthesisService};
pub use timing::{ProportionalEstimator, WordTimingEstimator};
pub use worker::{SpeechModel, ThreadWorkerSpawner, WorkerSpawner};
