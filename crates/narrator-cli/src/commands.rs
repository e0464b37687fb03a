//! Subcommand definitions.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the voices the backend can speak with
    Voices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Synthesize text into a WAV file
    Synth {
        /// Text to synthesize
        text: String,
        /// Voice id (falls back to the stored preference, then the default)
        #[arg(long, env = "NARRATOR_VOICE")]
        voice: Option<String>,
        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,
        /// Decoding steps (1-10)
        #[arg(long)]
        lsd: Option<f64>,
    },
    /// Speak text on the default audio device, printing each word as it plays
    Speak {
        /// Text to speak
        text: String,
        /// Voice id (falls back to the stored preference, then the default)
        #[arg(long, env = "NARRATOR_VOICE")]
        voice: Option<String>,
        /// Playback rate (0.5-2.0)
        #[arg(long, default_value_t = 1.0)]
        rate: f32,
        /// Output volume (0-1)
        #[arg(long, default_value_t = 1.0)]
        volume: f32,
    },
    /// Load the model and report backend status
    Status,
    /// Store the preferred voice
    SetVoice {
        /// Voice id
        voice: String,
    },
}
