//! Key/value settings port.

use async_trait::async_trait;
use thiserror::Error;

/// Key under which the reader persists the preferred narrator voice.
pub const VOICE_SETTING_KEY: &str = "tts_voice_id";

/// Errors from a settings backend.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted user settings, addressed by string key.
///
/// The playback engine reads the stored voice preference through this port
/// and treats a missing key as "use the default".
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a setting. `Ok(None)` when the key was never written.
    async fn get_setting(&self, key: &str) -> Result<Option<String>, SettingsError>;

    /// Write a setting, replacing any previous value.
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}
