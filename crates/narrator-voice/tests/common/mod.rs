//! Fakes shared by the narrator-voice integration tests.
//!
//! Nothing here touches audio hardware, model files or the network: the
//! worker side of the protocol is played by the test itself, the audio
//! output runs on a hand-cranked clock, and synthesis returns silence.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use narrator_voice::error::{PlaybackError, SynthesisError};
use narrator_voice::framing::{self, DecodedAudio};
use narrator_voice::playback::{AudioOutput, EndedCallback, OutputFactory};
use narrator_voice::synthesis::{SpeechResponse, SpeechSynthesizer};
use narrator_voice::worker::{WorkerLink, WorkerMessage, WorkerRequest, WorkerSpawner};
use narrator_voice::VoicePromptSource;
use tokio::sync::{Notify, mpsc};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

// ── Scripted worker ────────────────────────────────────────────────

/// The worker end of one spawned link, driven by the test.
pub struct ScriptedWorker {
    pub requests: mpsc::UnboundedReceiver<WorkerRequest>,
    pub messages: mpsc::UnboundedSender<WorkerMessage>,
}

impl ScriptedWorker {
    /// Next request from the service.
    pub async fn expect(&mut self) -> WorkerRequest {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("timed out waiting for a worker request")
            .expect("service dropped the worker")
    }

    pub fn send(&self, message: WorkerMessage) {
        self.messages.send(message).expect("service stopped listening");
    }

    /// Answer the spawn handshake and the load sequence.
    pub async fn boot(&mut self, voices: &[&str]) {
        assert!(matches!(self.expect().await, WorkerRequest::SetLsd { .. }));
        assert_eq!(self.expect().await, WorkerRequest::Ping);
        self.send(WorkerMessage::BootReady);
        assert!(matches!(
            self.expect().await,
            WorkerRequest::SetModelBaseUrl { .. }
        ));
        assert_eq!(self.expect().await, WorkerRequest::Load);
        self.send(WorkerMessage::VoicesLoaded {
            voices: voices.iter().map(ToString::to_string).collect(),
            default_voice: None,
        });
        self.send(WorkerMessage::Loaded);
    }

    /// `true` when the service has sent nothing further.
    pub fn is_quiet(&mut self) -> bool {
        self.requests.try_recv().is_err()
    }
}

/// Hands every spawned worker to the test through a channel.
pub struct ScriptedSpawner {
    spawned: mpsc::UnboundedSender<ScriptedWorker>,
    pub spawn_count: AtomicUsize,
}

impl ScriptedSpawner {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedWorker>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawner = Arc::new(Self {
            spawned: tx,
            spawn_count: AtomicUsize::new(0),
        });
        (spawner, rx)
    }
}

impl WorkerSpawner for ScriptedSpawner {
    fn spawn(&self) -> Result<WorkerLink, SynthesisError> {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        self.spawned
            .send(ScriptedWorker {
                requests: req_rx,
                messages: msg_tx,
            })
            .map_err(|e| SynthesisError::WorkerSpawn(e.to_string()))?;
        Ok(WorkerLink {
            requests: req_tx,
            messages: msg_rx,
            thread: None,
        })
    }
}

pub async fn next_worker(spawned: &mut mpsc::UnboundedReceiver<ScriptedWorker>) -> ScriptedWorker {
    tokio::time::timeout(WAIT, spawned.recv())
        .await
        .expect("timed out waiting for a spawn")
        .expect("spawner dropped")
}

// ── Prompt assets ──────────────────────────────────────────────────

/// Serves a short 16 kHz WAV for every voice and counts fetches.
#[derive(Default)]
pub struct MemoryPrompts {
    pub fetches: AtomicUsize,
    /// Held closed until the test calls `notify_one`.
    pub gate: Option<Arc<Notify>>,
}

#[async_trait]
impl VoicePromptSource for MemoryPrompts {
    async fn fetch_prompt(&self, _voice_id: &str, _path: &str) -> Result<Vec<u8>, SynthesisError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(framing::encode_wav(&vec![0.1; 1600], 16_000)?)
    }
}

// ── Synthesis ──────────────────────────────────────────────────────

/// What [`CountingSynthesizer`] answers with.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Silence of the given length. Encoded at 1 kHz to keep tests quick.
    Silence(f64),
    Garbage,
    Fail,
}

pub struct CountingSynthesizer {
    pub reply: Mutex<Reply>,
    pub calls: AtomicUsize,
    pub voices: Mutex<Vec<String>>,
    pub gate: Option<Arc<Notify>>,
}

impl CountingSynthesizer {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            voices: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(reply: Reply, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(reply)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }
}

#[async_trait]
impl SpeechSynthesizer for CountingSynthesizer {
    async fn synthesize(&self, _text: &str, voice_id: &str) -> Result<SpeechResponse, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.voices.lock().unwrap().push(voice_id.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let reply = *self.reply.lock().unwrap();
        match reply {
            Reply::Silence(seconds) => {
                let samples = vec![0.0; (seconds * 1000.0) as usize];
                Ok(SpeechResponse {
                    wav: framing::encode_wav(&samples, 1000)?,
                    sample_rate: 1000,
                    duration: seconds,
                })
            }
            Reply::Garbage => Ok(SpeechResponse {
                wav: b"definitely not audio".to_vec(),
                sample_rate: 1000,
                duration: 0.0,
            }),
            Reply::Fail => Err(SynthesisError::Backend("model exploded".into())),
        }
    }
}

// ── Audio output ───────────────────────────────────────────────────

#[derive(Default)]
pub struct OutputLog {
    pub now: f64,
    pub running: bool,
    /// `(offset, rate)` of every started source.
    pub starts: Vec<(f64, f32)>,
    pub callbacks: Vec<Option<EndedCallback>>,
    pub stops: usize,
    pub rate: f32,
    pub volume: f32,
}

/// Output with a hand-cranked clock. Cloning shares the log.
#[derive(Clone, Default)]
pub struct ManualOutput {
    pub log: Arc<Mutex<OutputLog>>,
}

impl ManualOutput {
    pub fn factory(&self) -> OutputFactory {
        let output = self.clone();
        Box::new(move || Ok(Box::new(output.clone()) as Box<dyn AudioOutput>))
    }

    /// Advance the clock; a suspended output does not move.
    pub fn advance(&self, seconds: f64) {
        let mut log = self.log.lock().unwrap();
        if log.running {
            log.now += seconds;
        }
    }

    /// Report natural completion of source `index` (0-based start order).
    pub fn finish_source(&self, index: usize) {
        let callback = self
            .log
            .lock()
            .unwrap()
            .callbacks
            .get_mut(index)
            .and_then(Option::take);
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Report natural completion of the latest source.
    pub fn finish(&self) {
        let last = self.log.lock().unwrap().callbacks.len().saturating_sub(1);
        self.finish_source(last);
    }

    pub fn starts(&self) -> Vec<(f64, f32)> {
        self.log.lock().unwrap().starts.clone()
    }
}

impl AudioOutput for ManualOutput {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn start(
        &mut self,
        _audio: Arc<DecodedAudio>,
        offset: f64,
        rate: f32,
        on_ended: EndedCallback,
    ) -> Result<(), PlaybackError> {
        let mut log = self.log.lock().unwrap();
        log.running = true;
        log.starts.push((offset, rate));
        log.callbacks.push(Some(on_ended));
        Ok(())
    }

    // Callbacks are kept so tests can simulate a device end racing a stop.
    fn stop(&mut self) {
        self.log.lock().unwrap().stops += 1;
    }

    fn suspend(&mut self) {
        self.log.lock().unwrap().running = false;
    }

    fn resume(&mut self) {
        self.log.lock().unwrap().running = true;
    }

    fn set_rate(&mut self, rate: f32) {
        self.log.lock().unwrap().rate = rate;
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.lock().unwrap().volume = volume;
    }
}
