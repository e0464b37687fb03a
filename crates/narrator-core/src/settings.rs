//! Settings store adapters.
//!
//! [`InMemorySettings`] backs tests and ephemeral sessions.
//! [`JsonFileSettings`] persists a flat JSON object on disk and is what the
//! command-line front end uses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{SettingsError, SettingsStore};

/// Settings file name inside the platform config directory.
const SETTINGS_FILE: &str = "settings.json";

/// `<config dir>/narrator/settings.json`, or `None` when the platform has no
/// config directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("narrator").join(SETTINGS_FILE))
}

/// Process-local settings map.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with initial values.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(map),
        }
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings persisted as a JSON object of string values.
///
/// The file is read on every lookup so edits made by other processes are
/// picked up. A missing file reads as empty.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&values)?;
        tokio::fs::write(&self.path, json).await?;

        tracing::debug!(key, path = %self.path.display(), "Setting persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::VOICE_SETTING_KEY;

    #[tokio::test]
    async fn in_memory_round_trips_values() {
        let store = InMemorySettings::with_values([(VOICE_SETTING_KEY, "marius")]);
        assert_eq!(
            store.get_setting(VOICE_SETTING_KEY).await.unwrap().as_deref(),
            Some("marius")
        );
        assert!(store.get_setting("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_file_missing_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettings::new(dir.path().join("nope.json"));
        assert!(store.get_setting(VOICE_SETTING_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_file_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        JsonFileSettings::new(&path)
            .set_setting(VOICE_SETTING_KEY, "cosette")
            .await
            .unwrap();

        let reopened = JsonFileSettings::new(&path);
        assert_eq!(
            reopened
                .get_setting(VOICE_SETTING_KEY)
                .await
                .unwrap()
                .as_deref(),
            Some("cosette")
        );
    }

    #[tokio::test]
    async fn json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, b"not json").unwrap();

        let store = JsonFileSettings::new(&path);
        assert!(matches!(
            store.get_setting(VOICE_SETTING_KEY).await,
            Err(SettingsError::Serialization(_))
        ));
    }
}
