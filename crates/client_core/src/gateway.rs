use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use shared::{
    domain::{HeadsetDescriptor, HeadsetId},
    protocol::{
        ControlReply, SelectHeadsetRequest, StartRecordingRequest, CONNECT_PATH,
        DISCONNECT_PATH, HEADSETS_PATH, RESTART_RECORDING_PATH, SELECT_HEADSET_PATH,
        START_RECORDING_PATH,
    },
};
use tracing::{debug, warn};

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    Connect,
    ListHeadsets,
    SelectHeadset,
    StartRecording,
    RestartRecording,
    Disconnect,
}

impl ControlOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ListHeadsets => "list-headsets",
            Self::SelectHeadset => "select-headset",
            Self::StartRecording => "start-recording",
            Self::RestartRecording => "restart-recording",
            Self::Disconnect => "disconnect",
        }
    }

    fn route(self) -> (Method, &'static str) {
        match self {
            Self::Connect => (Method::POST, CONNECT_PATH),
            Self::ListHeadsets => (Method::GET, HEADSETS_PATH),
            Self::SelectHeadset => (Method::POST, SELECT_HEADSET_PATH),
            Self::StartRecording => (Method::POST, START_RECORDING_PATH),
            Self::RestartRecording => (Method::POST, RESTART_RECORDING_PATH),
            Self::Disconnect => (Method::POST, DISCONNECT_PATH),
        }
    }

    pub fn fallback_message(self) -> &'static str {
        match self {
            Self::Connect => "Could not connect to the device service.",
            Self::ListHeadsets => "Failed to query headsets.",
            Self::SelectHeadset => "Could not connect to the selected headset.",
            Self::StartRecording => "Could not start the recording.",
            Self::RestartRecording => "Could not restart the recording.",
            Self::Disconnect => "Disconnect request failed.",
        }
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request/response façade over the control API. One exchange per call, no
/// retries; resubmission is the caller's decision.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    async fn connect(&self) -> Result<(), GatewayError>;
    async fn list_headsets(&self) -> Result<Vec<HeadsetDescriptor>, GatewayError>;
    async fn select_headset(&self, headset_id: &HeadsetId) -> Result<(), GatewayError>;
    async fn start_recording(&self, duration_seconds: u32) -> Result<(), GatewayError>;
    async fn restart_recording(&self) -> Result<(), GatewayError>;
    async fn disconnect(&self) -> Result<(), GatewayError>;
}

/// Local precondition for `start-recording`: rejects non-positive durations
/// before any request is made.
pub fn validate_duration(duration_seconds: i64) -> Result<u32, GatewayError> {
    if duration_seconds <= 0 {
        return Err(GatewayError::LocalRejection {
            op: ControlOp::StartRecording,
            reason: "Recording duration must be greater than zero.".to_string(),
        });
    }
    u32::try_from(duration_seconds).map_err(|_| GatewayError::LocalRejection {
        op: ControlOp::StartRecording,
        reason: format!("Recording duration of {duration_seconds} seconds is too long."),
    })
}

pub struct HttpCommandGateway {
    http: Client,
    base_url: String,
}

impl HttpCommandGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn exchange<B>(&self, op: ControlOp, body: Option<&B>) -> Result<ControlReply, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let (method, path) = op.route();
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let transport = |err: reqwest::Error| GatewayError::Transport {
            op,
            detail: err.to_string(),
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let raw = response.bytes().await.map_err(transport)?;
        let reply = serde_json::from_slice::<ControlReply>(&raw).ok();
        debug!(op = op.name(), %status, "gateway: reply received");

        match reply {
            Some(reply) if status.is_success() && reply.is_success() => Ok(reply),
            None if status.is_success() => Ok(ControlReply::success()),
            Some(reply) => {
                let message = reply
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| op.fallback_message().to_string());
                warn!(op = op.name(), %status, %message, "gateway: service reported failure");
                Err(GatewayError::Service { op, message })
            }
            None => {
                warn!(op = op.name(), %status, "gateway: failure without a readable body");
                Err(GatewayError::Service {
                    op,
                    message: op.fallback_message().to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl CommandGateway for HttpCommandGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        self.exchange::<()>(ControlOp::Connect, None).await?;
        Ok(())
    }

    async fn list_headsets(&self) -> Result<Vec<HeadsetDescriptor>, GatewayError> {
        let reply = self.exchange::<()>(ControlOp::ListHeadsets, None).await?;
        Ok(reply.headsets.unwrap_or_default())
    }

    async fn select_headset(&self, headset_id: &HeadsetId) -> Result<(), GatewayError> {
        let body = SelectHeadsetRequest {
            headset_id: headset_id.clone(),
        };
        self.exchange(ControlOp::SelectHeadset, Some(&body)).await?;
        Ok(())
    }

    async fn start_recording(&self, duration_seconds: u32) -> Result<(), GatewayError> {
        let duration_seconds = validate_duration(i64::from(duration_seconds))?;
        let body = StartRecordingRequest { duration_seconds };
        self.exchange(ControlOp::StartRecording, Some(&body)).await?;
        Ok(())
    }

    async fn restart_recording(&self) -> Result<(), GatewayError> {
        self.exchange::<()>(ControlOp::RestartRecording, None).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.exchange::<()>(ControlOp::Disconnect, None).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
