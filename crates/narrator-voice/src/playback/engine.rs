//! Playback engine: transport state machine and timing model.
//!
//! ```text
//! idle ──play──▶ buffering ──audio ready──▶ playing ⇄ paused
//!   ▲                                          │
//!   └───────────── natural end / stop ─────────┘
//! any failure ──▶ error   (left by the next play)
//! ```
//!
//! The engine owns the output and the decoded buffer. While playing, a
//! fixed-cadence tick republishes progress and derives the active word.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use narrator_core::{
    AudioProgress, EndReason, PlaybackState, SettingsStore, VOICE_SETTING_KEY, WordChange,
    WordTiming,
};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::output::{AudioOutput, EndedCallback, OutputFactory};
use crate::catalog::DEFAULT_VOICE;
use crate::error::{AudioError, PlaybackError};
use crate::framing::{self, DecodedAudio};
use crate::synthesis::SpeechSynthesizer;
use crate::timing::{ProportionalEstimator, WordTimingEstimator, active_word_index};

pub const MIN_PLAYBACK_RATE: f32 = 0.5;
pub const MAX_PLAYBACK_RATE: f32 = 2.0;

/// Capacity of the word-change broadcast. Slow subscribers skip ahead.
const WORD_EVENT_CAPACITY: usize = 64;

/// Configuration for the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Voice used when neither the caller nor the settings store names one.
    pub default_voice: String,
    /// Progress/word tick cadence while playing.
    pub tick_interval: Duration,
    /// Step for [`PlaybackEngine::skip_forward`] / [`PlaybackEngine::skip_backward`].
    pub skip_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_voice: DEFAULT_VOICE.to_string(),
            tick_interval: Duration::from_millis(100),
            skip_seconds: 15.0,
        }
    }
}

// ── Transport ──────────────────────────────────────────────────────

struct Transport {
    state: PlaybackState,
    output: Option<Box<dyn AudioOutput>>,
    audio: Option<Arc<DecodedAudio>>,
    /// Identifies the current source; completions for older ids are stale.
    source_id: u64,
    /// Identifies the current `play()` request.
    play_ticket: u64,
    rate: f32,
    volume: f32,
    start_clock: f64,
    start_offset: f64,
    paused_at: f64,
    /// A seek happened while paused; resume must restart the source.
    restart_on_resume: bool,
    end_reason: EndReason,
    word_timings: Vec<WordTiming>,
    word_index: Option<usize>,
    ticker: Option<JoinHandle<()>>,
}

impl Transport {
    fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |audio| audio.duration())
    }

    fn current_time(&self) -> f64 {
        match self.state {
            PlaybackState::Playing => self.output.as_ref().map_or(0.0, |output| {
                let elapsed = (output.now() - self.start_clock).max(0.0);
                (self.start_offset + elapsed * f64::from(self.rate)).min(self.duration())
            }),
            PlaybackState::Paused => self.paused_at,
            _ => 0.0,
        }
    }

    fn is_active(&self) -> bool {
        matches!(self.state, PlaybackState::Buffering | PlaybackState::Playing)
    }

    fn progress(&self) -> AudioProgress {
        AudioProgress {
            current_time: self.current_time(),
            duration: self.duration(),
            is_buffering: self.state == PlaybackState::Buffering,
        }
    }
}

struct EngineShared {
    config: PlaybackConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: Arc<dyn SettingsStore>,
    outputs: OutputFactory,
    estimator: Box<dyn WordTimingEstimator>,
    runtime: Option<Handle>,
    state_tx: watch::Sender<PlaybackState>,
    progress_tx: watch::Sender<AudioProgress>,
    words_tx: broadcast::Sender<WordChange>,
    transport: Mutex<Transport>,
}

// ── Builder ────────────────────────────────────────────────────────

/// Assembles a [`PlaybackEngine`].
pub struct PlaybackEngineBuilder {
    config: PlaybackConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: Arc<dyn SettingsStore>,
    outputs: Option<OutputFactory>,
    estimator: Box<dyn WordTimingEstimator>,
}

impl PlaybackEngineBuilder {
    #[must_use]
    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Output used instead of the default `rodio` device.
    #[must_use]
    pub fn output(mut self, outputs: OutputFactory) -> Self {
        self.outputs = Some(outputs);
        self
    }

    #[must_use]
    pub fn estimator(mut self, estimator: Box<dyn WordTimingEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Build the engine. Call from within a Tokio runtime so the progress
    /// tick can be scheduled.
    pub fn build(self) -> PlaybackEngine {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            tracing::warn!("Playback engine built outside a Tokio runtime; progress ticks disabled");
        }

        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        let (progress_tx, _) = watch::channel(AudioProgress::default());
        let (words_tx, _) = broadcast::channel(WORD_EVENT_CAPACITY);

        let transport = Transport {
            state: PlaybackState::Idle,
            output: None,
            audio: None,
            source_id: 0,
            play_ticket: 0,
            rate: 1.0,
            volume: 1.0,
            start_clock: 0.0,
            start_offset: 0.0,
            paused_at: 0.0,
            restart_on_resume: false,
            end_reason: EndReason::Unknown,
            word_timings: Vec::new(),
            word_index: None,
            ticker: None,
        };

        PlaybackEngine {
            shared: Arc::new(EngineShared {
                config: self.config,
                synthesizer: self.synthesizer,
                settings: self.settings,
                outputs: self
                    .outputs
                    .unwrap_or_else(super::rodio_output::RodioOutput::factory),
                estimator: self.estimator,
                runtime,
                state_tx,
                progress_tx,
                words_tx,
                transport: Mutex::new(transport),
            }),
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────────

/// Handle to one "now playing" transport. Cheap to clone.
#[derive(Clone)]
pub struct PlaybackEngine {
    shared: Arc<EngineShared>,
}

impl PlaybackEngine {
    pub fn builder(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        settings: Arc<dyn SettingsStore>,
    ) -> PlaybackEngineBuilder {
        PlaybackEngineBuilder {
            config: PlaybackConfig::default(),
            synthesizer,
            settings,
            outputs: None,
            estimator: Box::new(ProportionalEstimator),
        }
    }

    // ── Observation ────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.shared.lock().state
    }

    /// Subscribe to state transitions. The receiver holds the current state.
    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to progress. Only actual changes are published.
    pub fn subscribe_progress(&self) -> watch::Receiver<AudioProgress> {
        self.shared.progress_tx.subscribe()
    }

    /// Subscribe to active-word changes.
    pub fn subscribe_words(&self) -> broadcast::Receiver<WordChange> {
        self.shared.words_tx.subscribe()
    }

    pub fn progress(&self) -> AudioProgress {
        self.shared.lock().progress()
    }

    pub fn current_time(&self) -> f64 {
        self.shared.lock().current_time()
    }

    pub fn duration(&self) -> f64 {
        self.shared.lock().duration()
    }

    pub fn last_end_reason(&self) -> EndReason {
        self.shared.lock().end_reason
    }

    pub fn playback_rate(&self) -> f32 {
        self.shared.lock().rate
    }

    pub fn volume(&self) -> f32 {
        self.shared.lock().volume
    }

    pub fn word_timings(&self) -> Vec<WordTiming> {
        self.shared.lock().word_timings.clone()
    }

    pub fn current_word_index(&self) -> Option<usize> {
        self.shared.lock().word_index
    }

    /// Replace the estimated timings with backend-provided ones.
    pub fn set_word_timings(&self, timings: Vec<WordTiming>) {
        let mut t = self.shared.lock();
        t.word_timings = timings;
        self.shared.update_word(&mut t);
    }

    // ── Transport ──────────────────────────────────────────────────

    /// Synthesize `text` and play it from the start.
    ///
    /// Ignored while buffering or playing. Failures move the engine to
    /// [`PlaybackState::Error`] and are also returned.
    pub async fn play(&self, text: &str, voice_id: Option<&str>) -> Result<(), PlaybackError> {
        let shared = &self.shared;
        let needs_output = {
            let t = shared.lock();
            if t.is_active() {
                tracing::debug!(state = ?t.state, "play() ignored, already active");
                return Ok(());
            }
            t.output.is_none()
        };
        // Opening the device blocks on the audio thread's handshake.
        let opened = if needs_output {
            Some(shared.open_output().await)
        } else {
            None
        };

        let ticket = {
            let mut t = shared.lock();
            if t.is_active() {
                tracing::debug!(state = ?t.state, "play() ignored, already active");
                return Ok(());
            }
            match opened {
                Some(Ok(output)) => shared.install_output(&mut t, output),
                Some(Err(e)) => {
                    shared.fail(&mut t, &e);
                    return Err(e);
                }
                None => {}
            }
            t.play_ticket += 1;
            shared.set_state(&mut t, PlaybackState::Buffering);
            t.play_ticket
        };

        let mut buffering = BufferingGuard {
            shared,
            ticket,
            armed: true,
        };
        let loaded = shared.load(text, voice_id).await;
        buffering.disarm();

        let mut t = shared.lock();
        if t.play_ticket != ticket || t.state != PlaybackState::Buffering {
            tracing::debug!("Discarding audio for a superseded play request");
            return Ok(());
        }

        let audio = match loaded {
            Ok(audio) => Arc::new(audio),
            Err(e) => {
                shared.fail(&mut t, &e);
                return Err(e);
            }
        };

        if t.audio.is_some() {
            t.end_reason = EndReason::Replaced;
        }
        shared.discard_source(&mut t);
        t.word_timings = shared.estimator.estimate(text, audio.duration());
        t.audio = Some(audio);
        t.paused_at = 0.0;
        t.restart_on_resume = false;

        if let Err(e) = shared.start_source(&mut t, 0.0) {
            shared.fail(&mut t, &e);
            return Err(e);
        }
        tracing::info!(duration_s = t.duration(), words = t.word_timings.len(), "Playback started");
        shared.set_state(&mut t, PlaybackState::Playing);
        Ok(())
    }

    /// Pause at the current position. Only acts while playing.
    pub fn pause(&self) {
        let shared = &self.shared;
        let mut t = shared.lock();
        if t.state != PlaybackState::Playing {
            return;
        }
        let position = t.current_time();
        t.paused_at = position;
        t.start_offset = position;
        if let Some(output) = t.output.as_mut() {
            output.suspend();
        }
        shared.set_state(&mut t, PlaybackState::Paused);
    }

    /// Continue from the paused position. Only acts while paused.
    pub fn resume(&self) {
        let shared = &self.shared;
        let mut t = shared.lock();
        if t.state != PlaybackState::Paused {
            return;
        }

        let position = t.paused_at;
        if t.restart_on_resume {
            t.restart_on_resume = false;
            if let Err(e) = shared.start_source(&mut t, position) {
                shared.fail(&mut t, &e);
                return;
            }
        } else if let Some(output) = t.output.as_mut() {
            output.resume();
            let now = output.now();
            t.start_clock = now;
            t.start_offset = position;
        }
        shared.set_state(&mut t, PlaybackState::Playing);
    }

    /// Stop and return to idle from any state.
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut t = shared.lock();
        t.end_reason = EndReason::Stopped;
        shared.stop_internal(&mut t);
    }

    /// Move to `position` seconds, clamped to the audio length.
    ///
    /// Playing sources restart at the new offset; a paused transport only
    /// records it. Progress is republished immediately.
    pub fn seek(&self, position: f64) {
        let shared = &self.shared;
        let mut t = shared.lock();
        if t.audio.is_none() {
            return;
        }
        let target = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, t.duration())
        };

        match t.state {
            PlaybackState::Playing => {
                if let Err(e) = shared.start_source(&mut t, target) {
                    shared.fail(&mut t, &e);
                    return;
                }
            }
            PlaybackState::Paused => {
                t.paused_at = target;
                t.start_offset = target;
                t.restart_on_resume = true;
            }
            _ => {}
        }

        shared.publish_progress(&t);
        shared.update_word(&mut t);
    }

    /// Seek relative to the current position.
    pub fn skip_by(&self, delta: f64) {
        let position = self.current_time() + delta;
        self.seek(position);
    }

    pub fn skip_forward(&self) {
        self.skip_by(self.shared.config.skip_seconds);
    }

    pub fn skip_backward(&self) {
        self.skip_by(-self.shared.config.skip_seconds);
    }

    /// Set the playback rate, clamped to 0.5–2.0. Returns the applied rate.
    pub fn set_playback_rate(&self, rate: f32) -> f32 {
        let mut t = self.shared.lock();
        if rate.is_nan() {
            return t.rate;
        }
        let rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        if t.state == PlaybackState::Playing {
            // Re-anchor so time already played keeps the old rate.
            let position = t.current_time();
            t.start_offset = position;
            t.start_clock = t.output.as_ref().map_or(0.0, |output| output.now());
        }
        t.rate = rate;
        if let Some(output) = t.output.as_mut() {
            output.set_rate(rate);
        }
        rate
    }

    /// Set the output volume, clamped to 0–1. Returns the applied volume.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let mut t = self.shared.lock();
        if volume.is_nan() {
            return t.volume;
        }
        let volume = volume.clamp(0.0, 1.0);
        t.volume = volume;
        if let Some(output) = t.output.as_mut() {
            output.set_volume(volume);
        }
        volume
    }

    /// Stop playback and release the output device.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let mut t = shared.lock();
        t.end_reason = EndReason::Stopped;
        shared.stop_internal(&mut t);
        t.output = None;
        t.audio = None;
        tracing::debug!("Playback engine shut down");
    }
}

/// Returns the transport to idle when a `play()` future is dropped while
/// its synthesis is still in flight.
struct BufferingGuard<'a> {
    shared: &'a Arc<EngineShared>,
    ticket: u64,
    armed: bool,
}

impl BufferingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for BufferingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut t = self.shared.lock();
        if t.play_ticket == self.ticket && t.state == PlaybackState::Buffering {
            tracing::debug!("Play request dropped while buffering");
            t.end_reason = EndReason::Stopped;
            self.shared.stop_internal(&mut t);
        }
    }
}

impl EngineShared {
    fn lock(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open_output(self: &Arc<Self>) -> Result<Box<dyn AudioOutput>, PlaybackError> {
        let shared = Arc::clone(self);
        tokio::task::spawn_blocking(move || (shared.outputs)())
            .await
            .map_err(|e| PlaybackError::OutputStream(format!("output task failed: {e}")))?
    }

    /// Adopt a freshly opened output unless a concurrent `play()` already did.
    fn install_output(&self, t: &mut Transport, mut output: Box<dyn AudioOutput>) {
        if t.output.is_some() {
            return;
        }
        output.set_volume(t.volume);
        output.set_rate(t.rate);
        t.output = Some(output);
    }

    /// Explicit voice, then the stored preference, then the default.
    async fn resolve_voice(&self, explicit: Option<&str>) -> String {
        if let Some(voice) = explicit.filter(|v| !v.trim().is_empty()) {
            return voice.to_string();
        }
        match self.settings.get_setting(VOICE_SETTING_KEY).await {
            Ok(Some(voice)) if !voice.trim().is_empty() => voice,
            Ok(_) => self.config.default_voice.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read voice preference, using default");
                self.config.default_voice.clone()
            }
        }
    }

    async fn load(&self, text: &str, voice_id: Option<&str>) -> Result<DecodedAudio, PlaybackError> {
        let voice = self.resolve_voice(voice_id).await;
        let response = self.synthesizer.synthesize(text, &voice).await?;
        let audio = tokio::task::spawn_blocking(move || framing::decode(response.wav))
            .await
            .map_err(|e| AudioError::Decode(format!("decode task failed: {e}")))??;
        Ok(audio)
    }

    fn set_state(self: &Arc<Self>, t: &mut Transport, next: PlaybackState) {
        let old = t.state;
        t.state = next;
        if old != next {
            tracing::debug!(old = ?old, new = ?next, "Playback state transition");
        }
        self.state_tx.send_replace(next);

        if next == PlaybackState::Playing {
            self.start_ticker(t);
        } else if let Some(ticker) = t.ticker.take() {
            ticker.abort();
        }

        self.publish_progress(t);
        self.update_word(t);
    }

    fn fail(self: &Arc<Self>, t: &mut Transport, error: &PlaybackError) {
        tracing::error!(error = %error, "Playback failed");
        t.end_reason = EndReason::Error;
        self.discard_source(t);
        self.set_state(t, PlaybackState::Error);
    }

    fn stop_internal(self: &Arc<Self>, t: &mut Transport) {
        self.discard_source(t);
        t.start_offset = 0.0;
        t.paused_at = 0.0;
        t.restart_on_resume = false;
        self.set_state(t, PlaybackState::Idle);
    }

    /// Retire the current source. Its completion callback is detached (by
    /// id) before the output is told to stop.
    fn discard_source(&self, t: &mut Transport) {
        t.source_id += 1;
        if let Some(output) = t.output.as_mut() {
            output.stop();
        }
    }

    fn start_source(self: &Arc<Self>, t: &mut Transport, offset: f64) -> Result<(), PlaybackError> {
        let Some(audio) = t.audio.clone() else {
            return Ok(());
        };
        t.source_id += 1;
        let id = t.source_id;
        let rate = t.rate;

        let weak: Weak<Self> = Arc::downgrade(self);
        let on_ended: EndedCallback = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_source_ended(id);
            }
        });

        let Some(output) = t.output.as_mut() else {
            return Err(PlaybackError::OutputStream("no audio output".into()));
        };
        output.start(audio, offset, rate, on_ended)?;
        t.start_clock = output.now();
        t.start_offset = offset;
        Ok(())
    }

    fn on_source_ended(self: &Arc<Self>, id: u64) {
        let mut t = self.lock();
        if id != t.source_id || t.state != PlaybackState::Playing {
            return;
        }
        tracing::info!("Playback finished");
        t.end_reason = EndReason::Ended;
        t.start_offset = 0.0;
        t.paused_at = 0.0;
        self.set_state(&mut t, PlaybackState::Idle);
    }

    fn start_ticker(self: &Arc<Self>, t: &mut Transport) {
        if let Some(ticker) = t.ticker.take() {
            ticker.abort();
        }
        let Some(runtime) = &self.runtime else {
            return;
        };

        let weak = Arc::downgrade(self);
        let period = self.config.tick_interval;
        t.ticker = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.tick();
            }
        }));
    }

    fn tick(&self) {
        let mut t = self.lock();
        if t.state != PlaybackState::Playing {
            return;
        }
        self.publish_progress(&t);
        self.update_word(&mut t);
    }

    fn publish_progress(&self, t: &Transport) {
        let next = t.progress();
        self.progress_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Edge-triggered: only a changed index is broadcast.
    fn update_word(&self, t: &mut Transport) {
        let index = match t.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                active_word_index(&t.word_timings, t.current_time())
            }
            _ => None,
        };
        if index == t.word_index {
            return;
        }
        t.word_index = index;
        let _ = self.words_tx.send(WordChange {
            index,
            timing: index.and_then(|i| t.word_timings.get(i).cloned()),
        });
    }
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        let t = self
            .transport
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(ticker) = t.ticker.take() {
            ticker.abort();
        }
    }
}
