use anyhow::Result;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext, json: bool) -> Result<()> {
    let voices = ctx.synthesis.get_voices().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&voices)?);
        return Ok(());
    }

    let width = voices.iter().map(|v| v.id.len()).max().unwrap_or(0);
    for voice in &voices {
        println!(
            "{:<width$}  {:<12}  {}",
            voice.id, voice.display_name, voice.description
        );
    }
    Ok(())
}
