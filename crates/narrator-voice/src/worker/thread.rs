//! Dedicated OS-thread worker hosting a [`SpeechModel`].

use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;

use super::protocol::{LogLevel, WorkerMessage, WorkerRequest};
use super::{SpeechModel, WorkerLink, WorkerSpawner};
use crate::error::SynthesisError;

/// Builds the model on the worker thread. Called once per spawned worker.
pub type ModelFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn SpeechModel>> + Send + Sync>;

/// Spawns one `narrator-synth` thread per worker.
#[derive(Clone)]
pub struct ThreadWorkerSpawner {
    factory: ModelFactory,
}

impl ThreadWorkerSpawner {
    pub fn new(factory: ModelFactory) -> Self {
        Self { factory }
    }
}

impl std::fmt::Debug for ThreadWorkerSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadWorkerSpawner").finish_non_exhaustive()
    }
}

impl WorkerSpawner for ThreadWorkerSpawner {
    fn spawn(&self) -> Result<WorkerLink, SynthesisError> {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let factory = Arc::clone(&self.factory);

        let thread = thread::Builder::new()
            .name("narrator-synth".into())
            .spawn(move || run(&factory, req_rx, &msg_tx))
            .map_err(|e| SynthesisError::WorkerSpawn(e.to_string()))?;

        Ok(WorkerLink {
            requests: req_tx,
            messages: msg_rx,
            thread: Some(thread),
        })
    }
}

// ── Worker thread event loop ───────────────────────────────────────

/// Body of the worker thread. Owns the model for its entire lifetime.
///
/// Exits on `Shutdown`, when the service drops its request sender, or when
/// the service stops listening.
fn run(
    factory: &ModelFactory,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    messages: &mpsc::UnboundedSender<WorkerMessage>,
) {
    let mut model = match factory() {
        Ok(model) => model,
        Err(e) => {
            let _ = messages.send(WorkerMessage::error(format!(
                "Failed to boot speech model: {e:#}"
            )));
            return;
        }
    };

    if messages.send(WorkerMessage::BootReady).is_err() {
        return;
    }

    let mut base_url = String::new();
    let mut loaded = false;

    while let Some(request) = requests.blocking_recv() {
        let reply = match request {
            WorkerRequest::Ping => vec![WorkerMessage::BootReady],

            WorkerRequest::SetModelBaseUrl { base_url: url } => {
                base_url = url;
                Vec::new()
            }

            WorkerRequest::SetLsd { lsd } => {
                model.set_lsd(lsd);
                Vec::new()
            }

            WorkerRequest::Load => {
                let _ = messages.send(WorkerMessage::status("loading", "Loading model"));
                match model.load(&base_url) {
                    Ok(info) => {
                        loaded = true;
                        vec![
                            WorkerMessage::Log {
                                level: LogLevel::Info,
                                message: format!(
                                    "Model loaded from '{base_url}' with {} built-in voices",
                                    info.voices.len()
                                ),
                            },
                            WorkerMessage::VoicesLoaded {
                                voices: info.voices,
                                default_voice: info.default_voice,
                            },
                            WorkerMessage::Loaded,
                        ]
                    }
                    Err(e) => vec![WorkerMessage::error(format!("Failed to load model: {e:#}"))],
                }
            }

            WorkerRequest::Shutdown => break,

            _ if !loaded => vec![WorkerMessage::error("Speech model is not loaded")],

            WorkerRequest::RegisterVoice { voice_name, audio } => {
                match model.register_voice(&voice_name, &audio) {
                    Ok(()) => vec![WorkerMessage::VoiceRegistered { voice_name }],
                    Err(e) => vec![WorkerMessage::error(format!(
                        "Failed to register voice '{voice_name}': {e:#}"
                    ))],
                }
            }

            WorkerRequest::SetVoice { voice_name } => match model.set_voice(&voice_name) {
                Ok(()) => vec![WorkerMessage::VoiceSet {
                    voice_name: Some(voice_name),
                }],
                Err(e) => vec![WorkerMessage::error(format!(
                    "Failed to set voice '{voice_name}': {e:#}"
                ))],
            },

            WorkerRequest::Generate { text, voice } => {
                let _ = messages.send(WorkerMessage::status("running", "Generating"));
                let chunk_tx = messages.clone();
                let mut emit = move |data: Vec<f32>| {
                    let _ = chunk_tx.send(WorkerMessage::AudioChunk { data });
                };
                match model.generate(&text, &voice, &mut emit) {
                    Ok(()) => vec![
                        WorkerMessage::StreamEnded,
                        WorkerMessage::status("idle", "Ready"),
                    ],
                    Err(e) => vec![WorkerMessage::error(format!("Generation failed: {e:#}"))],
                }
            }
        };

        for message in reply {
            if messages.send(message).is_err() {
                tracing::debug!("Synthesis service went away, stopping worker");
                return;
            }
        }
    }

    tracing::debug!("Synthesis worker shutting down");
}
