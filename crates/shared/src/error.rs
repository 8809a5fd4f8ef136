use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    #[default]
    Success,
    Error,
}

/// Failure body returned by the control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub status: ReplyStatus,
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: message.into(),
        }
    }
}
