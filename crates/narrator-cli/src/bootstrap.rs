//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where the narrator stack is wired together
//! for the CLI adapter:
//! - Settings store (JSON file via narrator-core)
//! - Synthesis worker spawner and model factory (via narrator-voice)
//! - Synthesis service and prompt source
//!
//! Command handlers receive the composed [`CliContext`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use narrator_core::{JsonFileSettings, SettingsStore, default_settings_path};
use narrator_voice::catalog::DEFAULT_MODEL_BASE_URL;
use narrator_voice::playback::{PlaybackConfig, PlaybackEngine};
use narrator_voice::worker::{ModelFactory, ThreadWorkerSpawner};
use narrator_voice::{AssetPromptSource, SynthesisConfig, SynthesisService};

use crate::parser::Cli;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Directory or URL prefix holding model assets and voice prompts.
    pub model_dir: String,
    /// JSON settings file.
    pub settings_path: PathBuf,
}

impl CliConfig {
    /// Resolve configuration from parsed arguments and the environment.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let settings_path = match &cli.settings {
            Some(path) => path.clone(),
            None => default_settings_path().context("no config directory on this platform")?,
        };
        Ok(Self {
            model_dir: cli
                .model_dir
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string()),
            settings_path,
        })
    }
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    pub synthesis: SynthesisService,
    pub settings: Arc<dyn SettingsStore>,
}

impl CliContext {
    /// A playback engine on the default audio device.
    pub fn playback_engine(&self) -> PlaybackEngine {
        PlaybackEngine::builder(Arc::new(self.synthesis.clone()), Arc::clone(&self.settings))
            .config(PlaybackConfig {
                default_voice: self.synthesis.config().default_voice.clone(),
                ..PlaybackConfig::default()
            })
            .build()
    }
}

#[cfg(feature = "sherpa")]
fn backend() -> (ModelFactory, SynthesisConfig) {
    use narrator_voice::backend::{KokoroModel, kokoro_catalog};
    use narrator_voice::worker::SpeechModel;

    let factory: ModelFactory = Arc::new(|| -> anyhow::Result<Box<dyn SpeechModel>> {
        Ok(Box::new(KokoroModel::new()))
    });
    let config = SynthesisConfig {
        default_voice: "af_sarah".to_string(),
        catalog: kokoro_catalog(),
        ..SynthesisConfig::default()
    };
    (factory, config)
}

#[cfg(not(feature = "sherpa"))]
fn backend() -> (ModelFactory, SynthesisConfig) {
    use narrator_voice::worker::SpeechModel;

    let factory: ModelFactory = Arc::new(|| -> anyhow::Result<Box<dyn SpeechModel>> {
        anyhow::bail!("no speech backend compiled in; narrator was built without the `sherpa` feature")
    });
    (factory, SynthesisConfig::default())
}

/// Compose the CLI context. No worker starts until a command needs one.
pub fn bootstrap(config: CliConfig) -> CliContext {
    let (factory, synthesis_config) = backend();
    let synthesis_config = SynthesisConfig {
        model_base_url: config.model_dir.clone(),
        ..synthesis_config
    };

    tracing::debug!(
        model_dir = %config.model_dir,
        settings = %config.settings_path.display(),
        "Bootstrapping narrator"
    );

    let synthesis = SynthesisService::new(
        synthesis_config,
        Arc::new(ThreadWorkerSpawner::new(factory)),
        Arc::new(AssetPromptSource::new(config.model_dir)),
    );

    CliContext {
        synthesis,
        settings: Arc::new(JsonFileSettings::new(config.settings_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use narrator_core::VOICE_SETTING_KEY;

    #[test]
    fn explicit_paths_win() {
        let cli = Cli::parse_from([
            "narrator",
            "--model-dir",
            "/srv/models",
            "--settings",
            "/tmp/narrator.json",
            "status",
        ]);
        let config = CliConfig::from_cli(&cli).unwrap();
        assert_eq!(config.model_dir, "/srv/models");
        assert_eq!(config.settings_path, PathBuf::from("/tmp/narrator.json"));
    }

    #[tokio::test]
    async fn context_persists_settings_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let ctx = bootstrap(CliConfig {
            model_dir: dir.path().display().to_string(),
            settings_path: path.clone(),
        });

        ctx.settings
            .set_setting(VOICE_SETTING_KEY, "cosette")
            .await
            .unwrap();

        let reopened = JsonFileSettings::new(path);
        assert_eq!(
            reopened.get_setting(VOICE_SETTING_KEY).await.unwrap(),
            Some("cosette".to_string())
        );
        assert_eq!(ctx.synthesis.config().model_base_url, dir.path().display().to_string());
    }

    #[cfg(feature = "sherpa")]
    #[test]
    fn kokoro_backend_is_the_default() {
        let (_, config) = backend();
        assert_eq!(config.default_voice, "af_sarah");
        assert!(config.catalog.get("af_sarah").is_some());
        assert!(config.catalog.entries().iter().all(|e| e.prompt.is_none()));
    }

    #[cfg(not(feature = "sherpa"))]
    #[tokio::test]
    async fn missing_backend_reports_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = bootstrap(CliConfig {
            model_dir: dir.path().display().to_string(),
            settings_path: dir.path().join("settings.json"),
        });
        assert!(!ctx.synthesis.health_check().await);
        assert_eq!(
            ctx.synthesis.status().status,
            narrator_core::EngineStatus::Error
        );
    }
}
