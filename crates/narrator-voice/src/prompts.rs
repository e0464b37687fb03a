//! Voice prompt assets: where reference audio lives and how to fetch it.
//!
//! A prompt path is resolved against the model base location:
//! absolute `http(s)` URLs are used as-is, rooted paths (`/…`) are taken from
//! the origin of a URL base or the filesystem root, and anything else is
//! joined onto the base.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::SynthesisError;

/// Resolved location of a prompt asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptLocation {
    Remote(String),
    File(PathBuf),
}

fn is_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// `https://host:8080/a/b` → `https://host:8080`.
fn origin(url: &str) -> &str {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    url[authority_start..]
        .find('/')
        .map_or(url, |i| &url[..authority_start + i])
}

pub fn resolve_prompt_location(base: &str, path: &str) -> PromptLocation {
    if is_http(path) {
        return PromptLocation::Remote(path.to_string());
    }

    let base = base.trim_end_matches('/');
    if is_http(base) {
        let url = path.strip_prefix('/').map_or_else(
            || format!("{base}/{path}"),
            |rooted| format!("{}/{rooted}", origin(base)),
        );
        return PromptLocation::Remote(url);
    }

    if path.starts_with('/') || base.is_empty() {
        PromptLocation::File(PathBuf::from(path))
    } else {
        PromptLocation::File(Path::new(base).join(path))
    }
}

/// Fetches raw prompt bytes for a voice.
#[async_trait]
pub trait VoicePromptSource: Send + Sync {
    /// `path` is the catalog's prompt entry for `voice_id`.
    async fn fetch_prompt(&self, voice_id: &str, path: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Prompt source reading local files or downloading over HTTP.
#[derive(Debug, Clone)]
pub struct AssetPromptSource {
    base: String,
    client: reqwest::Client,
}

impl AssetPromptSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(base: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base: base.into(),
            client,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl VoicePromptSource for AssetPromptSource {
    async fn fetch_prompt(&self, voice_id: &str, path: &str) -> Result<Vec<u8>, SynthesisError> {
        let location = resolve_prompt_location(&self.base, path);
        tracing::debug!(voice = voice_id, ?location, "Fetching voice prompt");

        let fetched = match &location {
            PromptLocation::Remote(url) => self.download(url).await.map_err(|e| e.to_string()),
            PromptLocation::File(file) => tokio::fs::read(file)
                .await
                .map_err(|e| format!("{}: {e}", file.display())),
        };

        fetched.map_err(|reason| SynthesisError::PromptFetch {
            voice: voice_id.to_string(),
            reason,
        })
    }
}
