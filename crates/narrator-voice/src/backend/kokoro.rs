//! Kokoro speech model via `sherpa-rs`.
//!
//! Kokoro ships a fixed set of speaker styles, so voices need no prompt
//! enrollment: `load` reports every built-in speaker and `register_voice`
//! is rejected.

use std::path::Path;

use anyhow::{Context, bail};
use sherpa_rs::tts::{KokoroTts, KokoroTtsConfig};

use crate::catalog::{CatalogEntry, SAMPLE_RATE, VoiceCatalog};
use crate::framing;
use crate::worker::{LoadedModel, SpeechModel};
use narrator_core::VoiceDescriptor;

const DEFAULT_SPEAKER: &str = "af_sarah";

// Indices into `voices.bin`, from the `speaker2id` metadata of
// `kokoro-en-v0_19`.
const SPEAKERS: &[(&str, &str, &str)] = &[
    ("af", "Default", "American English"),
    ("af_bella", "Bella", "American English"),
    ("af_nicole", "Nicole", "American English"),
    ("af_sarah", "Sarah", "American English"),
    ("af_sky", "Sky", "American English"),
    ("am_adam", "Adam", "American English"),
    ("am_michael", "Michael", "American English"),
    ("bf_emma", "Emma", "British English"),
    ("bf_isabella", "Isabella", "British English"),
    ("bm_george", "George", "British English"),
    ("bm_lewis", "Lewis", "British English"),
];

/// Built-in Kokoro speakers. None of them carries a prompt.
pub fn kokoro_catalog() -> VoiceCatalog {
    VoiceCatalog::new(
        SPEAKERS
            .iter()
            .map(|(id, name, language)| CatalogEntry {
                voice: VoiceDescriptor::new(*id, *name, "Kokoro built-in speaker", *language),
                prompt: None,
            })
            .collect(),
    )
}

fn speaker_id(voice: &str) -> Option<i32> {
    SPEAKERS
        .iter()
        .position(|(id, _, _)| *id == voice)
        .and_then(|i| i32::try_from(i).ok())
}

/// Kokoro model hosted on the worker thread.
pub struct KokoroModel {
    engine: Option<KokoroTts>,
    speaker: i32,
    speed: f32,
}

impl KokoroModel {
    pub fn new() -> Self {
        Self {
            engine: None,
            speaker: speaker_id(DEFAULT_SPEAKER).unwrap_or(0),
            speed: 1.0,
        }
    }
}

impl Default for KokoroModel {
    fn default() -> Self {
        Self::new()
    }
}

fn path_string(path: &Path) -> anyhow::Result<String> {
    path.to_str()
        .map(ToString::to_string)
        .with_context(|| format!("invalid path: {}", path.display()))
}

impl SpeechModel for KokoroModel {
    fn load(&mut self, base_url: &str) -> anyhow::Result<LoadedModel> {
        let dir = Path::new(base_url);
        for file in ["model.onnx", "voices.bin", "tokens.txt"] {
            let path = dir.join(file);
            if !path.exists() {
                bail!("Kokoro model file not found: {}", path.display());
            }
        }

        tracing::info!(dir = %dir.display(), "Loading Kokoro model");
        let config = KokoroTtsConfig {
            model: path_string(&dir.join("model.onnx"))?,
            voices: path_string(&dir.join("voices.bin"))?,
            tokens: path_string(&dir.join("tokens.txt"))?,
            data_dir: path_string(&dir.join("espeak-ng-data"))?,
            length_scale: 1.0,
            ..Default::default()
        };
        self.engine = Some(KokoroTts::new(config));

        Ok(LoadedModel {
            voices: SPEAKERS.iter().map(|(id, _, _)| (*id).to_string()).collect(),
            default_voice: Some(DEFAULT_SPEAKER.to_string()),
        })
    }

    fn register_voice(&mut self, voice_name: &str, _audio: &[f32]) -> anyhow::Result<()> {
        bail!("Kokoro does not support voice prompts (requested {voice_name})")
    }

    fn set_voice(&mut self, voice_name: &str) -> anyhow::Result<()> {
        let Some(speaker) = speaker_id(voice_name) else {
            bail!("unknown Kokoro speaker: {voice_name}");
        };
        self.speaker = speaker;
        tracing::debug!(voice = voice_name, sid = speaker, "Kokoro speaker changed");
        Ok(())
    }

    fn generate(
        &mut self,
        text: &str,
        voice: &str,
        emit: &mut dyn FnMut(Vec<f32>),
    ) -> anyhow::Result<()> {
        let engine = self.engine.as_mut().context("model not loaded")?;
        let speaker = speaker_id(voice).unwrap_or(self.speaker);
        if text.trim().is_empty() {
            return Ok(());
        }

        let audio = engine
            .create(text, speaker, self.speed)
            .map_err(|e| anyhow::anyhow!("Kokoro synthesis failed: {e}"))?;

        let samples = if audio.sample_rate == SAMPLE_RATE {
            audio.samples
        } else {
            framing::resample(&audio.samples, audio.sample_rate, SAMPLE_RATE)?
        };
        emit(samples);
        Ok(())
    }
}
