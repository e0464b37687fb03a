//! Background synthesis worker: the isolated execution unit behind the
//! synthesis service.
//!
//! Model inference never runs on the async runtime. A [`WorkerSpawner`]
//! produces a [`WorkerLink`]: a request sender and a message receiver speaking
//! the [`protocol`] enums. The production spawner hosts a [`SpeechModel`] on a
//! dedicated OS thread; tests substitute a scripted spawner and play the
//! worker side of the protocol themselves.

pub mod protocol;
mod thread;

use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::error::SynthesisError;

pub use protocol::{LogLevel, WorkerMessage, WorkerRequest};
pub use thread::{ModelFactory, ThreadWorkerSpawner};

/// Result of loading a speech model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedModel {
    /// Voice ids usable immediately, without prompt enrollment.
    pub voices: Vec<String>,
    pub default_voice: Option<String>,
}

/// A text-to-speech model runtime, driven from the worker thread.
///
/// Every method is called from the same thread, in request order.
/// Implementations may block for as long as inference takes.
pub trait SpeechModel: Send {
    /// Load model weights from `base_url` (a directory or URL prefix).
    fn load(&mut self, base_url: &str) -> anyhow::Result<LoadedModel>;

    /// Adjust the decoding step count. Higher is slower and cleaner.
    fn set_lsd(&mut self, lsd: u8) {
        let _ = lsd;
    }

    /// Enroll `voice_name` from reference audio at the canonical rate.
    fn register_voice(&mut self, voice_name: &str, audio: &[f32]) -> anyhow::Result<()>;

    fn set_voice(&mut self, voice_name: &str) -> anyhow::Result<()>;

    /// Synthesize `text`, handing each finished chunk of canonical-rate mono
    /// samples to `emit` as soon as it is available.
    fn generate(
        &mut self,
        text: &str,
        voice: &str,
        emit: &mut dyn FnMut(Vec<f32>),
    ) -> anyhow::Result<()>;
}

/// Both ends of a live worker, as seen from the service.
pub struct WorkerLink {
    pub requests: mpsc::UnboundedSender<WorkerRequest>,
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
    /// OS thread hosting the worker, when there is one.
    pub thread: Option<JoinHandle<()>>,
}

/// Starts background workers. Called lazily on first use and on every reload.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self) -> Result<WorkerLink, SynthesisError>;
}
