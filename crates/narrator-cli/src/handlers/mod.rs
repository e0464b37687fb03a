//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that call the synthesis service or playback engine and
//!   format output for the terminal.

pub mod set_voice;
pub mod speak;
pub mod status;
pub mod synth;
pub mod voices;
