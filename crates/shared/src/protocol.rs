use serde::{Deserialize, Serialize};

use crate::{
    domain::{HeadsetDescriptor, HeadsetId},
    error::ReplyStatus,
};

pub const CONNECT_PATH: &str = "/api/connect";
pub const HEADSETS_PATH: &str = "/api/headsets";
pub const SELECT_HEADSET_PATH: &str = "/api/select_headset";
pub const START_RECORDING_PATH: &str = "/api/start_recording";
pub const RESTART_RECORDING_PATH: &str = "/api/restart_recording";
pub const DISCONNECT_PATH: &str = "/api/disconnect";
pub const EVENTS_PATH: &str = "/ws";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectHeadsetRequest {
    pub headset_id: HeadsetId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    pub duration_seconds: u32,
}

/// Envelope shared by every control reply. Failure replies carry `message`;
/// discovery replies carry `headsets`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlReply {
    #[serde(default)]
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headsets: Option<Vec<HeadsetDescriptor>>,
}

impl ControlReply {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn success_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_headsets(headsets: Vec<HeadsetDescriptor>) -> Self {
        Self {
            headsets: Some(headsets),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }
}

/// Events pushed by the service over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    RecordingStarted { duration: u32 },
    NewScore { score: f64 },
    RecordingEnded { average_score: f64 },
    RecordingCancelled {},
    ServerDisconnected { message: String },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecordingStarted { .. } => "recording_started",
            Self::NewScore { .. } => "new_score",
            Self::RecordingEnded { .. } => "recording_ended",
            Self::RecordingCancelled {} => "recording_cancelled",
            Self::ServerDisconnected { .. } => "server_disconnected",
        }
    }
}
