//! Synthesis service: lifecycle and request correlation for the worker.
//!
//! The service owns one background worker at a time and mediates every
//! request to it:
//!
//! ```text
//! idle ──ensure_ready──▶ loading ──loaded──▶ ready ◀──stream_ended── running
//!                                              └──────generate──────▶┘
//! any ──error──▶ error            (leave only through ensure_ready/reload)
//! ```
//!
//! Responses from the worker are matched to waiters by message type, and
//! voice registrations additionally by voice id. A backend-reported error
//! fails every outstanding waiter at once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use async_trait::async_trait;
use narrator_core::{EngineStatus, StatusSnapshot, VoiceDescriptor};
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::catalog::{
    DEFAULT_MODEL_BASE_URL, DEFAULT_VOICE, SAMPLE_RATE, VoiceCatalog, map_legacy_speaker,
};
use crate::error::SynthesisError;
use crate::framing;
use crate::prompts::VoicePromptSource;
use crate::worker::{LogLevel, WorkerLink, WorkerMessage, WorkerRequest, WorkerSpawner};

/// Default decoding step count sent to the backend.
pub const DEFAULT_LSD: u8 = 2;

const MIN_LSD: u8 = 1;
const MAX_LSD: u8 = 10;

/// Configuration for the synthesis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Directory or URL prefix holding model assets and voice prompts.
    pub model_base_url: String,

    /// Initial decoding step count (1–10).
    pub lsd: u8,

    /// Voice used when a request names none.
    pub default_voice: String,

    /// Curated voices for this backend.
    pub catalog: VoiceCatalog,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            lsd: DEFAULT_LSD,
            default_voice: DEFAULT_VOICE.to_string(),
            catalog: VoiceCatalog::curated(),
        }
    }
}

/// Synthesized speech as a WAV container at the canonical sample rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResponse {
    #[serde(rename = "audio", serialize_with = "serialize_base64")]
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    /// Seconds.
    pub duration: f64,
}

impl SpeechResponse {
    pub fn audio_base64(&self) -> String {
        framing::to_base64(&self.wav)
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&framing::to_base64(bytes))
}

/// Anything that turns text into speech. Implemented by [`SynthesisService`];
/// the playback engine only depends on this.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<SpeechResponse, SynthesisError>;
}

// ── Internal state ─────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T, SynthesisError>>;

/// The live worker and the task routing its messages back to us.
struct ActiveWorker {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    dispatcher: JoinHandle<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        // Best-effort shutdown. A thread stuck in inference is detached and
        // exits once it next looks at its request channel.
        let _ = self.requests.send(WorkerRequest::Shutdown);
        self.dispatcher.abort();
        if let Some(thread) = self.thread.take() {
            tracing::debug!(
                thread = ?thread.thread().name(),
                "Detached synthesis worker thread"
            );
        }
    }
}

struct PendingGeneration {
    ticket: u64,
    /// `None` while the voice switch preceding the generation is in flight.
    reply: Option<Reply<SpeechResponse>>,
    chunks: Vec<Vec<f32>>,
    started: Instant,
}

#[derive(Default)]
struct ServiceState {
    /// Bumped whenever the worker is replaced; stale messages are dropped.
    epoch: u64,
    worker: Option<ActiveWorker>,
    booted: bool,
    load_pending: bool,
    loaded: bool,
    load_started: Option<Instant>,
    lsd: u8,

    ready_waiters: Vec<Reply<()>>,
    registrations: HashMap<String, Vec<Reply<()>>>,
    pending_voice: Option<Reply<()>>,
    /// Acknowledgements still owed for voice switches whose caller went away.
    stale_voice_acks: usize,
    generation: Option<PendingGeneration>,
    next_ticket: u64,

    /// Voice ids the backend can speak with right now.
    voice_names: Vec<String>,
    voices: Vec<VoiceDescriptor>,
}

struct Shared {
    config: SynthesisConfig,
    spawner: Arc<dyn WorkerSpawner>,
    prompts: Arc<dyn VoicePromptSource>,
    status: watch::Sender<StatusSnapshot>,
    state: Mutex<ServiceState>,
    /// Orders voice switches: switch N settles before switch N+1 is sent.
    voice_turn: tokio::sync::Mutex<()>,
    /// One prompt enrollment pass at a time.
    prompt_sync: tokio::sync::Mutex<()>,
}

// ── Service ────────────────────────────────────────────────────────

/// Handle to the synthesis service. Cheap to clone; all clones share one
/// worker.
#[derive(Clone)]
pub struct SynthesisService {
    shared: Arc<Shared>,
}

impl SynthesisService {
    /// Create the service. No worker is started until first use.
    pub fn new(
        config: SynthesisConfig,
        spawner: Arc<dyn WorkerSpawner>,
        prompts: Arc<dyn VoicePromptSource>,
    ) -> Self {
        let lsd = config.lsd.clamp(MIN_LSD, MAX_LSD);
        let (status, _) = watch::channel(StatusSnapshot::default());
        let state = ServiceState {
            lsd,
            ..ServiceState::default()
        };

        Self {
            shared: Arc::new(Shared {
                config,
                spawner,
                prompts,
                status,
                state: Mutex::new(state),
                voice_turn: tokio::sync::Mutex::new(()),
                prompt_sync: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.shared.config
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.borrow().clone()
    }

    /// Subscribe to status changes.
    ///
    /// The receiver starts out holding the current status, so
    /// `borrow_and_update()` replays it before any future change.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.shared.status.subscribe()
    }

    /// Voice ids the backend reported or enrolled.
    pub fn voice_names(&self) -> Vec<String> {
        self.shared.lock().voice_names.clone()
    }

    /// Start the worker and load the model if that has not happened yet.
    ///
    /// Concurrent callers share one load. Resolves once the backend reports
    /// `loaded`; a backend error is returned to every waiter.
    pub async fn ensure_ready(&self) -> Result<(), SynthesisError> {
        let waiter = {
            let mut st = self.shared.lock();
            if st.loaded {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            let first = st.ready_waiters.is_empty();
            st.ready_waiters.push(tx);
            if first {
                self.shared.start_load(&mut st);
            }
            rx
        };
        waiter.await.unwrap_or(Err(SynthesisError::WorkerTerminated))
    }

    /// `true` when the backend is (or becomes) ready.
    pub async fn health_check(&self) -> bool {
        match self.ensure_ready().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis health check failed");
                false
            }
        }
    }

    /// Tear the worker down unconditionally and start over from `idle`.
    ///
    /// Everything pending is rejected with [`SynthesisError::WorkerTerminated`].
    pub async fn reload(&self) -> bool {
        tracing::info!("Reloading synthesis worker");
        self.teardown();
        self.health_check().await
    }

    /// Stop the worker and reject everything pending.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down synthesis service");
        self.teardown();
    }

    fn teardown(&self) {
        {
            let mut st = self.shared.lock();
            st.epoch += 1;
            st.worker = None;
            st.booted = false;
            st.voice_names.clear();
            self.shared
                .fail_all(&mut st, &SynthesisError::WorkerTerminated);
        }
        self.shared.set_status(EngineStatus::Idle, None);
    }

    /// Catalog merged with what the backend reports, after enrolling any
    /// curated voice that is still missing.
    ///
    /// Never fails: on any error the curated catalog is returned.
    pub async fn get_voices(&self) -> Vec<VoiceDescriptor> {
        let outcome = async {
            self.ensure_ready().await?;
            self.ensure_voice_prompts().await
        }
        .await;

        match outcome {
            Ok(()) => {
                let st = self.shared.lock();
                if st.voices.is_empty() {
                    self.shared.config.catalog.descriptors()
                } else {
                    st.voices.clone()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to curated voice catalog");
                self.shared.config.catalog.descriptors()
            }
        }
    }

    /// Enroll every curated voice the backend does not know yet.
    ///
    /// Individual enrollment failures are logged, not returned.
    pub async fn ensure_voice_prompts(&self) -> Result<(), SynthesisError> {
        self.ensure_ready().await?;
        if self.missing_prompts().is_empty() {
            return Ok(());
        }

        let _pass = self.shared.prompt_sync.lock().await;
        for voice in self.missing_prompts() {
            if let Err(e) = self.register_voice_prompt(&voice).await {
                tracing::warn!(voice = %voice, error = %e, "Voice prompt registration failed");
            }
        }
        Ok(())
    }

    fn missing_prompts(&self) -> Vec<String> {
        let st = self.shared.lock();
        self.shared
            .config
            .catalog
            .missing_prompts(&st.voice_names)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Fetch a voice's reference audio and enroll it with the backend.
    ///
    /// At most one enrollment per voice id is in flight; concurrent callers
    /// for the same id share its outcome.
    pub async fn register_voice_prompt(&self, voice_id: &str) -> Result<(), SynthesisError> {
        let Some(path) = self.shared.config.catalog.prompt_for(voice_id) else {
            tracing::debug!(voice = voice_id, "Voice has no prompt asset");
            return Ok(());
        };
        self.ensure_ready().await?;

        let (tx, rx) = oneshot::channel();
        let owner = match self.shared.lock().registrations.entry(voice_id.to_string()) {
            Entry::Occupied(mut waiters) => {
                waiters.get_mut().push(tx);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![tx]);
                true
            }
        };

        if owner {
            let mut enrolling = RegistrationGuard {
                shared: &self.shared,
                voice_id,
                armed: true,
            };
            let prepared = self.prepare_prompt(voice_id, path).await;
            enrolling.disarm();
            let mut st = self.shared.lock();
            match prepared {
                // A backend failure may have settled the entry meanwhile.
                Ok(audio) if st.registrations.contains_key(voice_id) => {
                    tracing::debug!(voice = voice_id, samples = audio.len(), "Enrolling voice");
                    let request = WorkerRequest::RegisterVoice {
                        voice_name: voice_id.to_string(),
                        audio,
                    };
                    if !self.shared.post(&st, request) {
                        settle(&mut st.registrations, voice_id, &SynthesisError::WorkerTerminated);
                    }
                }
                Ok(_) => {}
                Err(e) => settle(&mut st.registrations, voice_id, &e),
            }
        }

        rx.await.unwrap_or(Err(SynthesisError::WorkerTerminated))
    }

    async fn prepare_prompt(&self, voice_id: &str, path: &str) -> Result<Vec<f32>, SynthesisError> {
        let bytes = self.shared.prompts.fetch_prompt(voice_id, path).await?;
        let audio = tokio::task::spawn_blocking(move || framing::normalize(bytes, SAMPLE_RATE))
            .await
            .map_err(|e| SynthesisError::Backend(format!("prompt decode task failed: {e}")))??;
        Ok(audio)
    }

    /// Switch the backend voice, strictly one switch at a time.
    ///
    /// Unknown ids fall back to the first known voice. Returns the voice
    /// actually selected.
    async fn set_voice(&self, voice_id: &str) -> Result<String, SynthesisError> {
        self.ensure_voice_prompts().await?;

        let resolved = {
            let st = self.shared.lock();
            match st.voice_names.first() {
                Some(first) if !st.voice_names.iter().any(|n| n == voice_id) => {
                    tracing::warn!(
                        requested = voice_id,
                        fallback = %first,
                        "Voice is not registered, using first known voice"
                    );
                    first.clone()
                }
                _ => voice_id.to_string(),
            }
        };

        let _turn = self.shared.voice_turn.lock().await;
        let mut switching = VoiceSwitchGuard {
            shared: &self.shared,
            armed: false,
        };
        let waiter = {
            let mut st = self.shared.lock();
            let (tx, rx) = oneshot::channel();
            st.pending_voice = Some(tx);
            let request = WorkerRequest::SetVoice {
                voice_name: resolved.clone(),
            };
            if !self.shared.post(&st, request) {
                st.pending_voice = None;
                return Err(SynthesisError::WorkerTerminated);
            }
            switching.armed = true;
            rx
        };
        let switched = waiter.await.unwrap_or(Err(SynthesisError::WorkerTerminated));
        switching.disarm();
        switched?;

        tracing::debug!(voice = %resolved, "Voice switched");
        Ok(resolved)
    }

    /// Synthesize `text` with `voice_id` (or the configured default).
    ///
    /// Single-flight: while a generation is outstanding further calls fail
    /// with [`SynthesisError::AlreadyGenerating`] instead of queueing.
    pub async fn text_to_speech(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<SpeechResponse, SynthesisError> {
        self.ensure_ready().await?;
        let requested = map_legacy_speaker(voice_id.unwrap_or(&self.shared.config.default_voice));

        let ticket = {
            let mut st = self.shared.lock();
            if st.generation.is_some() {
                return Err(SynthesisError::AlreadyGenerating);
            }
            st.next_ticket += 1;
            let ticket = st.next_ticket;
            st.generation = Some(PendingGeneration {
                ticket,
                reply: None,
                chunks: Vec::new(),
                started: Instant::now(),
            });
            ticket
        };
        let mut slot = GenerationGuard {
            shared: &self.shared,
            ticket,
            armed: true,
        };

        let voice = self.set_voice(&requested).await?;

        let waiter = {
            let mut st = self.shared.lock();
            if !matches!(st.generation, Some(ref g) if g.ticket == ticket) {
                return Err(SynthesisError::WorkerTerminated);
            }
            let request = WorkerRequest::Generate {
                text: text.to_string(),
                voice: voice.clone(),
            };
            if !self.shared.post(&st, request) {
                st.generation = None;
                return Err(SynthesisError::WorkerTerminated);
            }
            let (tx, rx) = oneshot::channel();
            if let Some(generation) = st.generation.as_mut() {
                generation.reply = Some(tx);
                generation.started = Instant::now();
            }
            // From here the slot is released by stream_ended or a failure.
            slot.disarm();
            self.shared
                .set_status(EngineStatus::Running, Some("Generating".into()));
            rx
        };

        tracing::info!(chars = text.chars().count(), voice = %voice, "Generation started");

        waiter.await.unwrap_or(Err(SynthesisError::WorkerTerminated))
    }

    /// Set the decoding step count, rounded and clamped to 1–10.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn set_lsd(&self, value: f64) -> u8 {
        let mut st = self.shared.lock();
        if value.is_nan() {
            return st.lsd;
        }
        let lsd = value.round().clamp(f64::from(MIN_LSD), f64::from(MAX_LSD)) as u8;
        st.lsd = lsd;
        self.shared.post(&st, WorkerRequest::SetLsd { lsd });
        lsd
    }

    pub fn get_lsd(&self) -> u8 {
        self.shared.lock().lsd
    }
}

#[async_trait]
impl SpeechSynthesizer for SynthesisService {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<SpeechResponse, SynthesisError> {
        self.text_to_speech(text, Some(voice_id)).await
    }
}

// ── Cancellation guards ────────────────────────────────────────────

/// Releases a reserved generation slot if the caller goes away before the
/// generate request is posted.
struct GenerationGuard<'a> {
    shared: &'a Shared,
    ticket: u64,
    armed: bool,
}

impl GenerationGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(ticket = self.ticket, "Generation abandoned before it started");
            self.shared.release_generation(self.ticket);
        }
    }
}

/// Marks an unanswered voice switch as abandoned so its late
/// acknowledgement is not taken for the next switch's.
struct VoiceSwitchGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl VoiceSwitchGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for VoiceSwitchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut st = self.shared.lock();
        if st.pending_voice.take().is_some() {
            st.stale_voice_acks += 1;
        }
    }
}

/// Settles a voice's registration entry if its owner goes away while the
/// prompt is still being prepared.
struct RegistrationGuard<'a> {
    shared: &'a Shared,
    voice_id: &'a str,
    armed: bool,
}

impl RegistrationGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut st = self.shared.lock();
            settle(
                &mut st.registrations,
                self.voice_id,
                &SynthesisError::WorkerTerminated,
            );
        }
    }
}

// ── Message handling ───────────────────────────────────────────────

fn settle(
    registrations: &mut HashMap<String, Vec<Reply<()>>>,
    voice_id: &str,
    error: &SynthesisError,
) {
    if let Some(waiters) = registrations.remove(voice_id) {
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: EngineStatus, message: Option<String>) {
        self.status.send_if_modified(|current| {
            let next = StatusSnapshot::new(status, message);
            if *current == next {
                return false;
            }
            if current.status != status {
                tracing::debug!(old = %current.status, new = %status, "Synthesis status transition");
            }
            *current = next;
            true
        });
    }

    fn current_status(&self) -> EngineStatus {
        self.status.borrow().status
    }

    /// Send a request to the live worker. `false` when there is none.
    fn post(&self, st: &ServiceState, request: WorkerRequest) -> bool {
        st.worker
            .as_ref()
            .is_some_and(|worker| worker.requests.send(request).is_ok())
    }

    fn start_load(self: &Arc<Self>, st: &mut ServiceState) {
        st.load_started = Some(Instant::now());
        self.set_status(EngineStatus::Loading, Some("Loading models".into()));

        if let Err(e) = self.ensure_worker(st) {
            tracing::error!(error = %e, "Failed to start synthesis worker");
            self.fail_all(st, &e);
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return;
        }

        if st.booted {
            self.send_load(st);
        } else {
            st.load_pending = true;
        }
    }

    fn send_load(&self, st: &ServiceState) {
        let base_url = self.config.model_base_url.clone();
        tracing::info!(base_url = %base_url, "Loading speech model");
        self.post(st, WorkerRequest::SetModelBaseUrl { base_url });
        self.post(st, WorkerRequest::Load);
    }

    fn ensure_worker(self: &Arc<Self>, st: &mut ServiceState) -> Result<(), SynthesisError> {
        if st.worker.is_some() {
            return Ok(());
        }

        let WorkerLink {
            requests,
            messages,
            thread,
        } = self.spawner.spawn()?;

        st.epoch += 1;
        st.booted = false;
        let epoch = st.epoch;
        let dispatcher = tokio::spawn(dispatch(Arc::downgrade(self), epoch, messages));

        let _ = requests.send(WorkerRequest::SetLsd { lsd: st.lsd });
        let _ = requests.send(WorkerRequest::Ping);

        st.worker = Some(ActiveWorker {
            requests,
            dispatcher,
            thread,
        });
        tracing::info!(epoch, "Synthesis worker spawned");
        Ok(())
    }

    /// Reject every outstanding operation with `error`.
    fn fail_all(&self, st: &mut ServiceState, error: &SynthesisError) {
        st.loaded = false;
        st.load_pending = false;
        st.load_started = None;

        for waiter in st.ready_waiters.drain(..) {
            let _ = waiter.send(Err(error.clone()));
        }
        for (_, waiters) in st.registrations.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(error.clone()));
            }
        }
        if let Some(waiter) = st.pending_voice.take() {
            let _ = waiter.send(Err(error.clone()));
        }
        st.stale_voice_acks = 0;
        if let Some(reply) = st.generation.take().and_then(|g| g.reply) {
            let _ = reply.send(Err(error.clone()));
        }
    }

    fn release_generation(&self, ticket: u64) {
        let mut st = self.lock();
        if matches!(st.generation, Some(ref g) if g.ticket == ticket) {
            st.generation = None;
        }
    }

    fn handle_message(&self, epoch: u64, message: WorkerMessage) {
        let mut st = self.lock();
        if st.epoch != epoch {
            tracing::trace!(kind = message.kind(), "Dropping message from retired worker");
            return;
        }

        match message {
            WorkerMessage::BootReady => {
                st.booted = true;
                if st.load_pending {
                    st.load_pending = false;
                    self.send_load(&st);
                }
            }

            WorkerMessage::Status { state, status } => {
                self.apply_worker_status(state.as_deref(), status);
            }

            WorkerMessage::ModelStatus { status, text } => {
                if status == "ready" {
                    self.set_status(EngineStatus::Ready, text.or_else(|| Some("Ready".into())));
                } else {
                    tracing::debug!(status = %status, text = ?text, "Model status");
                }
            }

            WorkerMessage::Loaded => {
                st.loaded = true;
                let elapsed_ms = st
                    .load_started
                    .take()
                    .map(|t| u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX));
                tracing::info!(elapsed_ms = ?elapsed_ms, "Speech model loaded");
                self.set_status(EngineStatus::Ready, Some("Ready".into()));
                for waiter in st.ready_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }

            WorkerMessage::VoicesLoaded {
                mut voices,
                default_voice,
            } => {
                if let Some(default) = default_voice {
                    if !voices.contains(&default) {
                        voices.insert(0, default);
                    }
                }
                st.voices = self.config.catalog.merge(&voices);
                st.voice_names = voices;
            }

            WorkerMessage::VoiceRegistered { voice_name } => {
                if !st.voice_names.contains(&voice_name) {
                    st.voice_names.push(voice_name.clone());
                }
                st.voices = self.config.catalog.merge(&st.voice_names);
                if let Some(waiters) = st.registrations.remove(&voice_name) {
                    for waiter in waiters {
                        let _ = waiter.send(Ok(()));
                    }
                }
            }

            WorkerMessage::VoiceSet { .. } | WorkerMessage::VoiceEncoded { .. } => {
                if st.stale_voice_acks > 0 {
                    st.stale_voice_acks -= 1;
                    tracing::debug!("Ignoring acknowledgement of an abandoned voice switch");
                } else if let Some(waiter) = st.pending_voice.take() {
                    let _ = waiter.send(Ok(()));
                }
            }

            WorkerMessage::AudioChunk { data } => {
                if let Some(generation) = st.generation.as_mut().filter(|g| g.reply.is_some()) {
                    generation.chunks.push(data);
                }
            }

            WorkerMessage::StreamEnded => self.finish_generation(&mut st),

            WorkerMessage::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!(target: "narrator::worker", "{message}"),
                LogLevel::Info => tracing::info!(target: "narrator::worker", "{message}"),
                LogLevel::Warn => tracing::warn!(target: "narrator::worker", "{message}"),
                LogLevel::Error => tracing::error!(target: "narrator::worker", "{message}"),
            },

            WorkerMessage::Error { message } => {
                tracing::error!(error = %message, "Synthesis worker reported an error");
                self.fail_all(&mut st, &SynthesisError::Backend(message.clone()));
                self.set_status(EngineStatus::Error, Some(message));
            }
        }
    }

    fn apply_worker_status(&self, state: Option<&str>, message: Option<String>) {
        let current = self.current_status();
        let next = match state {
            Some("loading") => EngineStatus::Loading,
            Some("running") => EngineStatus::Running,
            Some("idle") if current == EngineStatus::Running => EngineStatus::Ready,
            _ => current,
        };
        let message = message.or_else(|| self.status.borrow().message.clone());
        self.set_status(next, message);
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish_generation(&self, st: &mut ServiceState) {
        let Some(PendingGeneration {
            reply: Some(reply),
            chunks,
            started,
            ..
        }) = st.generation.take()
        else {
            tracing::debug!("stream_ended without an active generation");
            return;
        };

        let samples = framing::concat_chunks(&chunks);
        let duration = samples.len() as f64 / f64::from(SAMPLE_RATE);
        let result = framing::encode_wav(&samples, SAMPLE_RATE)
            .map(|wav| SpeechResponse {
                wav,
                sample_rate: SAMPLE_RATE,
                duration,
            })
            .map_err(SynthesisError::from);

        tracing::info!(
            chunks = chunks.len(),
            samples = samples.len(),
            duration_s = duration,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Generation finished"
        );
        let _ = reply.send(result);

        if self.current_status() != EngineStatus::Error {
            self.set_status(EngineStatus::Ready, Some("Ready".into()));
        }
    }

    fn worker_exited(&self, epoch: u64) {
        let mut st = self.lock();
        if st.epoch != epoch {
            return;
        }
        st.worker = None;
        st.booted = false;

        let message = "Synthesis worker exited unexpectedly".to_string();
        tracing::error!("{message}");
        self.fail_all(&mut st, &SynthesisError::Backend(message.clone()));
        if self.current_status() != EngineStatus::Error {
            self.set_status(EngineStatus::Error, Some(message));
        }
    }
}

/// Route worker messages into the service until the worker goes away.
async fn dispatch(
    shared: Weak<Shared>,
    epoch: u64,
    mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    while let Some(message) = messages.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.handle_message(epoch, message);
    }
    if let Some(shared) = shared.upgrade() {
        shared.worker_exited(epoch);
    }
}
