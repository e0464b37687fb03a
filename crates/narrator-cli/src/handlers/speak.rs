use std::io::Write;

use anyhow::Result;
use narrator_core::{EndReason, PlaybackState};
use tokio::sync::broadcast::error::RecvError;

use crate::bootstrap::CliContext;

pub struct SpeakArgs {
    pub text: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub volume: f32,
}

pub async fn execute(ctx: &CliContext, args: SpeakArgs) -> Result<()> {
    let engine = ctx.playback_engine();
    engine.set_playback_rate(args.rate);
    engine.set_volume(args.volume);

    let mut words = engine.subscribe_words();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        loop {
            match words.recv().await {
                Ok(change) => {
                    if let Some(timing) = change.timing {
                        let _ = write!(stdout, "{} ", timing.word);
                        let _ = stdout.flush();
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut states = engine.subscribe_state();
    engine.play(&args.text, args.voice.as_deref()).await?;

    let outcome = tokio::select! {
        result = states.wait_for(|s| matches!(s, PlaybackState::Idle | PlaybackState::Error)) => {
            result.map(|s| *s)
        }
        _ = tokio::signal::ctrl_c() => {
            engine.stop();
            Ok(PlaybackState::Idle)
        }
    };

    printer.abort();
    println!();
    let reason = engine.last_end_reason();
    engine.shutdown();
    ctx.synthesis.shutdown();

    match (outcome?, reason) {
        (PlaybackState::Error, _) | (_, EndReason::Error) => anyhow::bail!("playback failed"),
        (_, EndReason::Stopped) => println!("Stopped."),
        _ => {}
    }
    Ok(())
}
