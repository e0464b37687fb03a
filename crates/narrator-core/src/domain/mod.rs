//! Domain types shared by the synthesis service and the playback engine.

mod page;
mod playback;
mod status;
mod voice;

pub use page::PageText;
pub use playback::{AudioProgress, EndReason, PlaybackState, WordChange, WordTiming};
pub use status::{EngineStatus, StatusSnapshot};
pub use voice::VoiceDescriptor;
