use serde::{Deserialize, Serialize};

/// A narrator voice as presented to the reader.
///
/// Identity is `id`. Descriptors are immutable once built; the catalog only
/// ever grows during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDescriptor {
    /// Voice identifier understood by the synthesis backend.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Short description of the voice character. Empty for voices the
    /// curated list does not know about.
    pub description: String,
    /// Language label.
    pub language: String,
}

impl VoiceDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
            language: language.into(),
        }
    }
}
