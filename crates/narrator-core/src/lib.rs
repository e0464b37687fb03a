//! Core domain types and ports for the narrator reading engine.
//!
//! This crate has no audio or model-runtime dependencies. It defines the
//! shapes that flow between the synthesis service, the playback engine and
//! the surrounding reader application, plus the ports through which the
//! engine reaches external collaborators (settings, page text).
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod ports;
pub mod settings;

pub use domain::{
    AudioProgress, EndReason, EngineStatus, PageText, PlaybackState, StatusSnapshot,
    VoiceDescriptor, WordChange, WordTiming,
};
pub use ports::{PageTextProvider, SettingsError, SettingsStore, VOICE_SETTING_KEY};
pub use settings::{InMemorySettings, JsonFileSettings, default_settings_path};
