use std::sync::Arc;

use async_trait::async_trait;
use futures::{future, stream::BoxStream, StreamExt};
use shared::protocol::{ServerEvent, EVENTS_PATH};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    epoch::{Epoch, EpochCounter},
    error::ChannelError,
};

pub type EventStream = BoxStream<'static, Result<ServerEvent, ChannelError>>;

/// Opens the transport behind the push channel. The stream ends when the
/// transport drops.
#[async_trait]
pub trait EventChannelConnector: Send + Sync {
    async fn connect(&self) -> Result<EventStream, ChannelError>;
}

/// The closed set of signals the controller receives from the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    RecordingStarted { duration: u32 },
    NewScore { score: f64 },
    RecordingEnded { average_score: f64 },
    RecordingCancelled,
    ServerDisconnected { message: String },
    /// The transport went away, for any reason including an explicit close.
    Closed,
}

impl From<ServerEvent> for ChannelEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::RecordingStarted { duration } => Self::RecordingStarted { duration },
            ServerEvent::NewScore { score } => Self::NewScore { score },
            ServerEvent::RecordingEnded { average_score } => Self::RecordingEnded { average_score },
            ServerEvent::RecordingCancelled {} => Self::RecordingCancelled,
            ServerEvent::ServerDisconnected { message } => Self::ServerDisconnected { message },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSignal {
    pub epoch: Epoch,
    pub event: ChannelEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle {
    epoch: Epoch,
}

impl ChannelHandle {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }
}

/// Owner of the single push-event subscription. Opening a new channel closes
/// the previous one; nothing reconnects on its own.
pub struct EventChannel {
    connector: Arc<dyn EventChannelConnector>,
    epochs: EpochCounter,
    active: Option<Epoch>,
}

impl EventChannel {
    pub fn new(connector: Arc<dyn EventChannelConnector>) -> Self {
        Self {
            connector,
            epochs: EpochCounter::new(),
            active: None,
        }
    }

    pub fn open<F>(&mut self, mut on_signal: F) -> ChannelHandle
    where
        F: FnMut(ChannelSignal) + Send + 'static,
    {
        if let Some(epoch) = self.active {
            self.close(ChannelHandle { epoch });
        }
        let epoch = self.epochs.advance();
        let mut watcher = self.epochs.watcher();
        let connector = Arc::clone(&self.connector);
        self.active = Some(epoch);

        tokio::spawn(async move {
            match connector.connect().await {
                Ok(mut stream) => loop {
                    tokio::select! {
                        biased;
                        _ = watcher.superseded() => {
                            debug!(epoch = epoch.value(), "event channel: closed locally");
                            break;
                        }
                        item = stream.next() => match item {
                            Some(Ok(event)) => {
                                debug!(epoch = epoch.value(), kind = event.kind(), "event channel: event");
                                on_signal(ChannelSignal { epoch, event: event.into() });
                            }
                            Some(Err(err)) => {
                                warn!(epoch = epoch.value(), error = %err, "event channel: transport error");
                                break;
                            }
                            None => {
                                info!(epoch = epoch.value(), "event channel: closed by service");
                                break;
                            }
                        }
                    }
                },
                Err(err) => warn!(epoch = epoch.value(), error = %err, "event channel: open failed"),
            }
            on_signal(ChannelSignal {
                epoch,
                event: ChannelEvent::Closed,
            });
        });

        ChannelHandle { epoch }
    }

    /// Closing a handle that is no longer the open channel does nothing.
    pub fn close(&mut self, handle: ChannelHandle) {
        if self.active == Some(handle.epoch) {
            self.active = None;
            self.epochs.advance();
            debug!(epoch = handle.epoch.value(), "event channel: close requested");
        }
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.active == Some(epoch)
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Some(epoch) = self.active {
            self.close(ChannelHandle { epoch });
        }
    }
}

/// Push channel over a WebSocket carrying JSON-encoded [`ServerEvent`]s.
#[derive(Debug, Clone)]
pub struct WsEventConnector {
    ws_url: String,
}

impl WsEventConnector {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    /// Derives `ws(s)://host/ws` from the control API's `http(s)://` base.
    pub fn from_service_url(service_url: &str) -> Result<Self, ChannelError> {
        let mut url =
            Url::parse(service_url).map_err(|err| ChannelError::InvalidUrl(err.to_string()))?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(ChannelError::InvalidUrl(format!(
                    "service url must start with http:// or https://, got {other}://"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ChannelError::InvalidUrl(service_url.to_string()))?;
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{EVENTS_PATH}"));
        Ok(Self::new(url.to_string()))
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

#[async_trait]
impl EventChannelConnector for WsEventConnector {
    async fn connect(&self) -> Result<EventStream, ChannelError> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|err| ChannelError::Connect(format!("{}: {err}", self.ws_url)))?;
        info!(url = %self.ws_url, "event channel: connected");

        let events = ws_stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => Some(Ok(event)),
                    Err(err) => {
                        warn!(error = %err, "event channel: skipping malformed event");
                        None
                    }
                },
                Ok(_) => None,
                Err(err) => Some(Err(ChannelError::Receive(err.to_string()))),
            })
        });
        Ok(events.boxed())
    }
}

#[cfg(test)]
#[path = "tests/event_channel_tests.rs"]
mod tests;
