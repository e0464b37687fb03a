use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the synthesis backend.
///
/// `idle → loading → ready → running → ready | error`. Only an explicit
/// reload leaves `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Running,
    Error,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Status plus the optional human-readable message that accompanies it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: EngineStatus,
    pub message: Option<String>,
}

impl StatusSnapshot {
    pub fn new(status: EngineStatus, message: Option<String>) -> Self {
        Self { status, message }
    }
}
