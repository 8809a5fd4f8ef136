//! Client-side session core for a neurofeedback recording station.
//!
//! [`SessionController`] owns the session lifecycle and is the only writer of
//! [`SessionState`]. It talks to the device service through a
//! [`CommandGateway`] and listens to it through an [`EventChannel`].

pub mod controller;
pub mod countdown;
pub mod discovery;
pub mod epoch;
pub mod error;
pub mod event_channel;
pub mod gateway;
pub mod throttle;
pub mod types;

pub use controller::{
    ControllerInput, SessionCommand, SessionController, SessionHandle, SessionSettings,
};
pub use discovery::{DiscoverySettings, HeadsetSource};
pub use error::{ChannelError, GatewayError, SessionError};
pub use event_channel::{EventChannel, EventChannelConnector, WsEventConnector};
pub use gateway::{CommandGateway, ControlOp, HttpCommandGateway};
pub use types::{
    format_clock, NoticeKind, RecordingSession, ResultsSummary, SessionSnapshot, SessionState,
    SessionUpdate,
};
