//! Narration engine error types.

/// Errors from audio framing (WAV encoding, decoding, resampling).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    /// Input bytes could not be decoded as audio.
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// Samples could not be written as a WAV container.
    #[error("Failed to encode WAV: {0}")]
    Encode(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    Resample(String),

    /// Decoded audio contained no samples.
    #[error("Audio contains no samples")]
    Empty,
}

/// Errors from the synthesis service.
///
/// `Clone` because one backend failure is delivered to every pending waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// The background worker reported an error.
    #[error("{0}")]
    Backend(String),

    /// A generation is already outstanding on this service.
    #[error("Speech synthesis is already generating audio")]
    AlreadyGenerating,

    /// The worker was torn down (reload or shutdown) before answering.
    #[error("Synthesis worker was terminated")]
    WorkerTerminated,

    /// The worker thread could not be started.
    #[error("Failed to start synthesis worker: {0}")]
    WorkerSpawn(String),

    /// The reference audio for a voice could not be fetched.
    #[error("Failed to fetch voice prompt for '{voice}': {reason}")]
    PromptFetch { voice: String, reason: String },

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Errors from the playback engine.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Failed to open the audio output device.
    #[error("Failed to open audio output stream: {0}")]
    OutputStream(String),

    /// The dedicated audio thread exited unexpectedly.
    #[error("Audio thread died unexpectedly")]
    AudioThreadDied,
}
