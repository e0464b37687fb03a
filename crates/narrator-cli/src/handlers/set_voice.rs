use anyhow::Result;
use narrator_core::VOICE_SETTING_KEY;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext, voice: &str) -> Result<()> {
    let voice = voice.trim();
    if voice.is_empty() {
        anyhow::bail!("voice id must not be empty");
    }
    if ctx.synthesis.config().catalog.get(voice).is_none() {
        tracing::warn!(voice, "Voice is not in the curated catalog");
    }

    ctx.settings.set_setting(VOICE_SETTING_KEY, voice).await?;
    println!("Default voice set to {voice}");
    Ok(())
}
