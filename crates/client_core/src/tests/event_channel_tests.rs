use super::*;
use std::{collections::VecDeque, time::Duration};

use axum::{
    extract::{ws::Message as WsMessage, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tokio_stream::wrappers::UnboundedReceiverStream;

type EventFeed = mpsc::UnboundedSender<Result<ServerEvent, ChannelError>>;

#[derive(Default)]
struct FakeConnector {
    pending: Mutex<VecDeque<Result<EventStream, ChannelError>>>,
}

impl FakeConnector {
    async fn push_stream(&self) -> EventFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending
            .lock()
            .await
            .push_back(Ok(UnboundedReceiverStream::new(rx).boxed()));
        tx
    }

    async fn push_failure(&self) {
        self.pending
            .lock()
            .await
            .push_back(Err(ChannelError::Connect("refused".to_string())));
    }
}

#[async_trait]
impl EventChannelConnector for FakeConnector {
    async fn connect(&self) -> Result<EventStream, ChannelError> {
        self.pending
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(ChannelError::Connect("no stream scripted".to_string())))
    }
}

fn open_collecting(
    channel: &mut EventChannel,
) -> (ChannelHandle, mpsc::UnboundedReceiver<ChannelSignal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = channel.open(move |signal| {
        let _ = tx.send(signal);
    });
    (handle, rx)
}

#[tokio::test]
async fn forwards_events_then_signals_closed_when_transport_ends() {
    let connector = Arc::new(FakeConnector::default());
    let feed = connector.push_stream().await;
    let mut channel = EventChannel::new(connector);
    let (handle, mut rx) = open_collecting(&mut channel);

    feed.send(Ok(ServerEvent::RecordingStarted { duration: 30 }))
        .expect("feed");
    feed.send(Ok(ServerEvent::NewScore { score: 57.0 }))
        .expect("feed");
    drop(feed);

    let epoch = handle.epoch();
    assert_eq!(
        rx.recv().await,
        Some(ChannelSignal {
            epoch,
            event: ChannelEvent::RecordingStarted { duration: 30 },
        })
    );
    assert_eq!(
        rx.recv().await,
        Some(ChannelSignal {
            epoch,
            event: ChannelEvent::NewScore { score: 57.0 },
        })
    );
    assert_eq!(
        rx.recv().await,
        Some(ChannelSignal {
            epoch,
            event: ChannelEvent::Closed,
        })
    );
    assert!(rx.recv().await.is_none());
    assert!(channel.is_current(epoch), "only the controller retires a handle");
}

#[tokio::test]
async fn transport_error_ends_channel() {
    let connector = Arc::new(FakeConnector::default());
    let feed = connector.push_stream().await;
    let mut channel = EventChannel::new(connector);
    let (_handle, mut rx) = open_collecting(&mut channel);

    feed.send(Err(ChannelError::Receive("reset".to_string())))
        .expect("feed");
    feed.send(Ok(ServerEvent::NewScore { score: 1.0 }))
        .expect("feed");

    let signal = rx.recv().await.expect("signal");
    assert_eq!(signal.event, ChannelEvent::Closed);
}

#[tokio::test]
async fn explicit_close_still_emits_closed_for_that_epoch() {
    let connector = Arc::new(FakeConnector::default());
    let _feed = connector.push_stream().await;
    let mut channel = EventChannel::new(connector);
    let (handle, mut rx) = open_collecting(&mut channel);

    tokio::time::sleep(Duration::from_millis(10)).await;
    channel.close(handle);
    assert!(!channel.is_open());
    assert!(!channel.is_current(handle.epoch()));

    let signal = rx.recv().await.expect("closed signal");
    assert_eq!(signal.epoch, handle.epoch());
    assert_eq!(signal.event, ChannelEvent::Closed);

    // Closing a retired handle is a no-op.
    channel.close(handle);
}

#[tokio::test]
async fn reopening_closes_the_previous_channel_first() {
    let connector = Arc::new(FakeConnector::default());
    let _first_feed = connector.push_stream().await;
    let second_feed = connector.push_stream().await;
    let mut channel = EventChannel::new(connector);

    let (first, mut first_rx) = open_collecting(&mut channel);
    let (second, mut second_rx) = open_collecting(&mut channel);
    assert_ne!(first, second);
    assert!(channel.is_current(second.epoch()));
    assert!(!channel.is_current(first.epoch()));

    let retired = first_rx.recv().await.expect("first closed");
    assert_eq!(retired.event, ChannelEvent::Closed);

    second_feed
        .send(Ok(ServerEvent::RecordingCancelled {}))
        .expect("feed");
    let signal = second_rx.recv().await.expect("second event");
    assert_eq!(signal.epoch, second.epoch());
    assert_eq!(signal.event, ChannelEvent::RecordingCancelled);
}

#[tokio::test]
async fn failed_open_reports_closed() {
    let connector = Arc::new(FakeConnector::default());
    connector.push_failure().await;
    let mut channel = EventChannel::new(connector);
    let (handle, mut rx) = open_collecting(&mut channel);

    let signal = rx.recv().await.expect("signal");
    assert_eq!(
        signal,
        ChannelSignal {
            epoch: handle.epoch(),
            event: ChannelEvent::Closed,
        }
    );
}

#[test]
fn derives_websocket_url_from_service_url() {
    let plain = WsEventConnector::from_service_url("http://127.0.0.1:5000").expect("http");
    assert_eq!(plain.ws_url(), "ws://127.0.0.1:5000/ws");

    let tls = WsEventConnector::from_service_url("https://devices.example.com/lab/").expect("https");
    assert_eq!(tls.ws_url(), "wss://devices.example.com/lab/ws");

    let err = WsEventConnector::from_service_url("ftp://example.com").expect_err("ftp");
    assert!(matches!(err, ChannelError::InvalidUrl(_)));
    assert!(WsEventConnector::from_service_url("not a url").is_err());
}

async fn scripted_socket(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket| async move {
        let frames = [
            r#"{"type":"recording_started","payload":{"duration":125}}"#,
            r#"{"type":"mystery","payload":{}}"#,
            "not json",
            r#"{"type":"server_disconnected","payload":{"message":"Connection to device lost unexpectedly."}}"#,
        ];
        for frame in frames {
            if socket.send(WsMessage::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        let _ = socket.send(WsMessage::Close(None)).await;
    })
}

#[tokio::test]
async fn websocket_connector_decodes_events_and_skips_malformed_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(EVENTS_PATH, get(scripted_socket));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let connector = Arc::new(
        WsEventConnector::from_service_url(&format!("http://{addr}")).expect("connector"),
    );
    let mut channel = EventChannel::new(connector);
    let (_handle, mut rx) = open_collecting(&mut channel);

    let mut events = Vec::new();
    while let Some(signal) = rx.recv().await {
        events.push(signal.event);
    }
    assert_eq!(
        events,
        vec![
            ChannelEvent::RecordingStarted { duration: 125 },
            ChannelEvent::ServerDisconnected {
                message: "Connection to device lost unexpectedly.".to_string(),
            },
            ChannelEvent::Closed,
        ]
    );
}
