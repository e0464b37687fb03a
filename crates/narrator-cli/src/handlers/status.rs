use anyhow::Result;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let healthy = ctx.synthesis.health_check().await;
    let status = ctx.synthesis.status();

    println!("Backend:  {}", ctx.synthesis.config().model_base_url);
    println!("Status:   {}", status.status);
    if let Some(message) = &status.message {
        println!("Message:  {message}");
    }
    println!("LSD:      {}", ctx.synthesis.get_lsd());
    if healthy {
        println!("Voices:   {}", ctx.synthesis.voice_names().join(", "));
    }

    ctx.synthesis.shutdown();
    if !healthy {
        anyhow::bail!("speech backend is not ready");
    }
    Ok(())
}
