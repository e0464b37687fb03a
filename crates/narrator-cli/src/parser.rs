//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the narrator reading engine.
#[derive(Parser)]
#[command(name = "narrator")]
#[command(about = "Synthesize and play back narrated text")]
#[command(version)]
pub struct Cli {
    /// Directory or URL prefix holding model assets and voice prompts
    #[arg(long = "model-dir", env = "NARRATOR_MODEL_DIR", global = true)]
    pub model_dir: Option<String>,

    /// Settings file (defaults to the platform config directory)
    #[arg(long = "settings", env = "NARRATOR_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "narrator",
            "--verbose",
            "--model-dir",
            "/tmp/models",
            "status",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.model_dir.as_deref(), Some("/tmp/models"));
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn test_speak_args() {
        let cli = Cli::parse_from([
            "narrator", "speak", "Hello there", "--voice", "marius", "--rate", "1.5",
        ]);
        match cli.command {
            Some(Commands::Speak {
                text, voice, rate, volume,
            }) => {
                assert_eq!(text, "Hello there");
                assert_eq!(voice.as_deref(), Some("marius"));
                assert!((rate - 1.5).abs() < f32::EPSILON);
                assert!((volume - 1.0).abs() < f32::EPSILON);
            }
            _ => panic!("expected speak"),
        }
    }

    #[test]
    fn test_synth_requires_output() {
        assert!(Cli::try_parse_from(["narrator", "synth", "Hello"]).is_err());
        let cli = Cli::try_parse_from(["narrator", "synth", "Hello", "-o", "out.wav"]).unwrap();
        match cli.command {
            Some(Commands::Synth { output, lsd, .. }) => {
                assert_eq!(output, PathBuf::from("out.wav"));
                assert!(lsd.is_none());
            }
            _ => panic!("expected synth"),
        }
    }
}
