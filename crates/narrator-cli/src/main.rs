//! CLI entry point - the composition root.
//!
//! Parses arguments, initializes logging, bootstraps the narrator stack and
//! dispatches to a handler.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use narrator_cli::handlers::speak::SpeakArgs;
use narrator_cli::{Cli, CliConfig, Commands, bootstrap, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::from_cli(&cli)?;
    let ctx = bootstrap(config);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Voices { json } => handlers::voices::execute(&ctx, json).await?,
        Commands::Synth {
            text,
            voice,
            output,
            lsd,
        } => handlers::synth::execute(&ctx, &text, voice, &output, lsd).await?,
        Commands::Speak {
            text,
            voice,
            rate,
            volume,
        } => {
            let args = SpeakArgs {
                text,
                voice,
                rate,
                volume,
            };
            handlers::speak::execute(&ctx, args).await?;
        }
        Commands::Status => handlers::status::execute(&ctx).await?,
        Commands::SetVoice { voice } => handlers::set_voice::execute(&ctx, &voice).await?,
    }

    Ok(())
}
