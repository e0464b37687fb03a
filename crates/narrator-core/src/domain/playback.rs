//! Transport-facing types published by the playback engine.

use serde::{Deserialize, Serialize};

/// Transport state of the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
    Error,
}

/// Why the last playback session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// The audio ran to completion.
    Ended,
    /// `stop()` was called.
    Stopped,
    /// A new `play()` discarded the previous audio.
    Replaced,
    Error,
    #[default]
    Unknown,
}

/// Snapshot of the transport position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProgress {
    /// Seconds from the start of the current audio.
    pub current_time: f64,
    /// Total length of the current audio in seconds.
    pub duration: f64,
    pub is_buffering: bool,
}

/// Time span of one word of the narrated text.
///
/// `start_char`/`end_char` are byte offsets into the synthesized text, so
/// `&text[start_char..end_char] == word`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub start_char: usize,
    pub end_char: usize,
}

/// Emitted when the active word changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordChange {
    /// Index into the word timing list, `None` when no word is active.
    pub index: Option<usize>,
    pub timing: Option<WordTiming>,
}
