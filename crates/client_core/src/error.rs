use shared::domain::HeadsetId;
use thiserror::Error;

use crate::{gateway::ControlOp, types::SessionState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Precondition failed before anything reached the network.
    #[error("{op} rejected locally: {reason}")]
    LocalRejection { op: ControlOp, reason: String },
    /// The service answered and reported a failure.
    #[error("{op} failed: {message}")]
    Service { op: ControlOp, message: String },
    #[error("{op} transport failure: {detail}")]
    Transport { op: ControlOp, detail: String },
}

impl GatewayError {
    pub fn op(&self) -> ControlOp {
        match self {
            Self::LocalRejection { op, .. } | Self::Service { op, .. } | Self::Transport { op, .. } => {
                *op
            }
        }
    }

    /// Text fit for the operator: the service's own message when it sent one,
    /// otherwise the generic fallback for the operation.
    pub fn user_message(&self) -> String {
        match self {
            Self::LocalRejection { reason, .. } => reason.clone(),
            Self::Service { message, .. } => message.clone(),
            Self::Transport { op, .. } => op.fallback_message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("invalid event channel url: {0}")]
    InvalidUrl(String),
    #[error("failed to open event channel: {0}")]
    Connect(String),
    #[error("event channel receive failed: {0}")]
    Receive(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {state}")]
    InvalidInState {
        action: &'static str,
        state: SessionState,
    },
    #[error("recording duration must be a positive number of seconds")]
    NonPositiveDuration,
    #[error("recording duration of {0} seconds is too long")]
    DurationTooLong(i64),
    #[error("headset {0} is not in the discovered list")]
    UnknownHeadset(HeadsetId),
    #[error("session controller is no longer running")]
    ControllerStopped,
}
