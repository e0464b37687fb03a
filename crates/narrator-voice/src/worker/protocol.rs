//! Messages exchanged with the background synthesis worker.
//!
//! Requests flow service → worker, messages flow worker → service. Both are
//! plain serde enums so the same shapes can travel over a thread channel or
//! a JSON-lines pipe to a subprocess.

use serde::{Deserialize, Serialize};

/// Instruction sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Ask the worker to announce itself once booted.
    Ping,
    SetModelBaseUrl {
        #[serde(rename = "baseUrl")]
        base_url: String,
    },
    /// Load model weights from the configured base location.
    Load,
    SetLsd {
        lsd: u8,
    },
    /// Enroll a voice from reference audio (canonical rate, mono).
    RegisterVoice {
        #[serde(rename = "voiceName")]
        voice_name: String,
        audio: Vec<f32>,
    },
    SetVoice {
        #[serde(rename = "voiceName")]
        voice_name: String,
    },
    Generate {
        text: String,
        voice: String,
    },
    Shutdown,
}

/// Severity of a worker `log` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Notification sent by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The worker finished booting and accepts instructions.
    BootReady,
    Status {
        #[serde(default)]
        state: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
    ModelStatus {
        status: String,
        #[serde(default)]
        text: Option<String>,
    },
    Loaded,
    VoicesLoaded {
        voices: Vec<String>,
        #[serde(rename = "defaultVoice", default)]
        default_voice: Option<String>,
    },
    VoiceRegistered {
        #[serde(rename = "voiceName")]
        voice_name: String,
    },
    VoiceSet {
        #[serde(rename = "voiceName", default)]
        voice_name: Option<String>,
    },
    VoiceEncoded {
        #[serde(rename = "voiceName", default)]
        voice_name: Option<String>,
    },
    AudioChunk {
        data: Vec<f32>,
    },
    StreamEnded,
    Log {
        level: LogLevel,
        message: String,
    },
    Error {
        #[serde(rename = "error")]
        message: String,
    },
}

impl WorkerMessage {
    pub fn status(state: &str, status: impl Into<String>) -> Self {
        Self::Status {
            state: Some(state.to_string()),
            status: Some(status.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Short label for logging, without payloads.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BootReady => "boot_ready",
            Self::Status { .. } => "status",
            Self::ModelStatus { .. } => "model_status",
            Self::Loaded => "loaded",
            Self::VoicesLoaded { .. } => "voices_loaded",
            Self::VoiceRegistered { .. } => "voice_registered",
            Self::VoiceSet { .. } => "voice_set",
            Self::VoiceEncoded { .. } => "voice_encoded",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::StreamEnded => "stream_ended",
            Self::Log { .. } => "log",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_snake_case_tags_and_camel_fields() {
        let json = serde_json::to_value(WorkerRequest::RegisterVoice {
            voice_name: "alba".into(),
            audio: vec![0.5],
        })
        .unwrap();
        assert_eq!(json["type"], "register_voice");
        assert_eq!(json["voiceName"], "alba");
    }

    #[test]
    fn error_message_reads_error_field() {
        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"error","error":"model missing"}"#).unwrap();
        assert_eq!(msg, WorkerMessage::error("model missing"));
    }

    #[test]
    fn voices_loaded_default_is_optional() {
        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"voices_loaded","voices":["alba"]}"#).unwrap();
        assert_eq!(
            msg,
            WorkerMessage::VoicesLoaded {
                voices: vec!["alba".into()],
                default_voice: None
            }
        );
        assert_eq!(msg.kind(), "voices_loaded");
    }
}
