//! Voice catalog: curated narrator voices and merging with backend reports.
//!
//! The curated list carries display metadata and the location of each
//! voice's reference prompt. Whatever the backend reports as installed is
//! merged on top: known ids keep their curated metadata, unknown ids get a
//! synthesized display name.

use narrator_core::VoiceDescriptor;
use serde::{Deserialize, Serialize};

/// Canonical sample rate of every buffer exchanged with the backend (24 kHz).
pub const SAMPLE_RATE: u32 = 24_000;

/// Where model assets and voice prompts live unless configured otherwise.
pub const DEFAULT_MODEL_BASE_URL: &str = "pocket-tts";

/// Default voice when neither the caller nor the settings store names one.
pub const DEFAULT_VOICE: &str = "alba";

const DEFAULT_LANGUAGE: &str = "English";

/// `(id, display name, description)` of the curated voices.
const CURATED: &[(&str, &str, &str)] = &[
    ("alba", "Alba", "Clear female voice, casual style"),
    ("marius", "Marius", "Male voice with natural tone"),
    ("javert", "Javert", "Deep authoritative male voice"),
    ("jean", "Jean", "Warm male voice"),
    ("fantine", "Fantine", "Gentle female voice"),
    ("cosette", "Cosette", "Young female voice"),
    ("eponine", "Eponine", "Expressive female voice"),
    ("azelma", "Azelma", "Soft female voice"),
];

/// Speaker ids from the previous TTS engine and their closest replacement.
const LEGACY_SPEAKERS: &[(&str, &str)] = &[
    ("aiden", "alba"),
    ("ryan", "marius"),
    ("vivian", "cosette"),
    ("serena", "fantine"),
    ("ono_anna", "eponine"),
    ("sohee", "azelma"),
];

/// A curated voice plus the asset used to enroll it with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub voice: VoiceDescriptor,
    /// Prompt asset path or URL. `None` for voices built into the model.
    pub prompt: Option<String>,
}

/// The curated voice list for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCatalog {
    entries: Vec<CatalogEntry>,
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self::curated()
    }
}

impl VoiceCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Voices cloned from reference prompts at `voices/<id>.wav`.
    pub fn curated() -> Self {
        let entries = CURATED
            .iter()
            .map(|(id, name, description)| CatalogEntry {
                voice: VoiceDescriptor::new(*id, *name, *description, DEFAULT_LANGUAGE),
                prompt: Some(format!("voices/{id}.wav")),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.voice.id == id)
    }

    pub fn descriptors(&self) -> Vec<VoiceDescriptor> {
        self.entries.iter().map(|e| e.voice.clone()).collect()
    }

    /// Prompt location for a voice, if it has one.
    pub fn prompt_for(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(|e| e.prompt.as_deref())
    }

    /// Ids of curated voices that need a prompt and are not in `registered`.
    pub fn missing_prompts<'a>(&'a self, registered: &[String]) -> Vec<&'a str> {
        self.entries
            .iter()
            .filter(|e| e.prompt.is_some())
            .map(|e| e.voice.id.as_str())
            .filter(|id| !registered.iter().any(|r| r == id))
            .collect()
    }

    /// Merge backend-reported voice ids with curated metadata.
    ///
    /// An empty report yields the curated list.
    pub fn merge(&self, names: &[String]) -> Vec<VoiceDescriptor> {
        if names.is_empty() {
            return self.descriptors();
        }
        names
            .iter()
            .map(|id| {
                self.get(id).map_or_else(
                    || VoiceDescriptor::new(id.as_str(), title_case(id), "", DEFAULT_LANGUAGE),
                    |entry| entry.voice.clone(),
                )
            })
            .collect()
    }
}

/// `"ono_anna"` → `"Ono Anna"`.
pub fn title_case(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalise a speaker id and translate ids from the previous engine.
pub fn map_legacy_speaker(speaker: &str) -> String {
    let normalized = speaker.trim().to_lowercase();
    LEGACY_SPEAKERS
        .iter()
        .find(|(legacy, _)| *legacy == normalized)
        .map_or(normalized, |(_, voice)| (*voice).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_has_prompts_for_every_voice() {
        let catalog = VoiceCatalog::curated();
        assert_eq!(catalog.entries().len(), 8);
        assert_eq!(catalog.prompt_for("javert"), Some("voices/javert.wav"));
        assert_eq!(catalog.get("alba").unwrap().voice.display_name, "Alba");
    }

    #[test]
    fn merge_empty_returns_curated() {
        let catalog = VoiceCatalog::curated();
        assert_eq!(catalog.merge(&[]), catalog.descriptors());
    }

    #[test]
    fn merge_synthesizes_unknown_voices() {
        let catalog = VoiceCatalog::curated();
        let merged = catalog.merge(&["marius".to_string(), "old-sea_captain".to_string()]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].description, "Male voice with natural tone");
        assert_eq!(merged[1].id, "old-sea_captain");
        assert_eq!(merged[1].display_name, "Old Sea Captain");
        assert_eq!(merged[1].description, "");
        assert_eq!(merged[1].language, "English");
    }

    #[test]
    fn missing_prompts_skips_registered_voices() {
        let catalog = VoiceCatalog::curated();
        let registered = vec!["alba".to_string(), "jean".to_string()];
        let missing = catalog.missing_prompts(&registered);

        assert_eq!(missing.len(), 6);
        assert!(!missing.contains(&"alba"));
        assert!(missing.contains(&"azelma"));
    }

    #[test]
    fn legacy_speakers_map_to_new_voices() {
        assert_eq!(map_legacy_speaker(" Vivian "), "cosette");
        assert_eq!(map_legacy_speaker("ONO_ANNA"), "eponine");
        assert_eq!(map_legacy_speaker("Javert"), "javert");
    }

    #[test]
    fn title_case_ignores_empty_segments() {
        assert_eq!(title_case("a__b"), "A B");
        assert_eq!(title_case(""), "");
    }
}
