//! Port definitions (trait abstractions) for external collaborators.
//!
//! The engine reaches the reader application only through these traits.
//!
//! # Design Rules
//!
//! - No audio or model-runtime types in any signature
//! - Absence is a normal answer (`Option`), never an error
//! - Implementations decide their own storage and threading

mod page_text;
mod settings_store;

pub use page_text::PageTextProvider;
pub use settings_store::{SettingsError, SettingsStore, VOICE_SETTING_KEY};
