use std::path::Path;

use anyhow::{Context, Result};
use narrator_core::VOICE_SETTING_KEY;

use crate::bootstrap::CliContext;

pub async fn execute(
    ctx: &CliContext,
    text: &str,
    voice: Option<String>,
    output: &Path,
    lsd: Option<f64>,
) -> Result<()> {
    if let Some(lsd) = lsd {
        let applied = ctx.synthesis.set_lsd(lsd);
        tracing::debug!(requested = lsd, applied, "LSD set");
    }

    let voice = match voice {
        Some(voice) => Some(voice),
        None => ctx.settings.get_setting(VOICE_SETTING_KEY).await?,
    };

    let response = ctx
        .synthesis
        .text_to_speech(text, voice.as_deref())
        .await
        .context("synthesis failed")?;

    tokio::fs::write(output, &response.wav)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Wrote {} ({:.2}s at {} Hz)",
        output.display(),
        response.duration,
        response.sample_rate
    );
    ctx.synthesis.shutdown();
    Ok(())
}
