use std::fmt;

use shared::domain::HeadsetDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    SelectingHeadset,
    ConnectingHeadset,
    Ready,
    Recording,
    Results,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::SelectingHeadset => "selecting headset",
            Self::ConnectingHeadset => "connecting headset",
            Self::Ready => "ready",
            Self::Recording => "recording",
            Self::Results => "showing results",
        }
    }

    /// States in which the event channel is expected to be open.
    pub fn has_channel(self) -> bool {
        matches!(self, Self::Ready | Self::Recording | Self::Results)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live while the state is `Recording`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub latest_score: Option<f64>,
}

impl RecordingSession {
    pub fn new(duration_seconds: u32) -> Self {
        Self {
            duration_seconds,
            remaining_seconds: duration_seconds,
            latest_score: None,
        }
    }

    pub fn clock(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

/// Live while the state is `Results`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultsSummary {
    pub average_score: f64,
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    /// An operator action refused before reaching the service.
    Rejected,
    Error,
}

/// Everything the operator-facing layer needs to render.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    HeadsetsFound(Vec<HeadsetDescriptor>),
    NoHeadsetsFound,
    Countdown {
        remaining: u32,
        display: String,
    },
    Score(f64),
    Results(ResultsSummary),
    Notice {
        kind: NoticeKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub headsets: Vec<HeadsetDescriptor>,
    pub recording: Option<RecordingSession>,
    pub results: Option<ResultsSummary>,
}
