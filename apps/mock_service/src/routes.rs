use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::HeadsetId,
    error::ApiError,
    protocol::{
        ControlReply, SelectHeadsetRequest, ServerEvent, StartRecordingRequest, CONNECT_PATH,
        DISCONNECT_PATH, EVENTS_PATH, HEADSETS_PATH, RESTART_RECORDING_PATH,
        SELECT_HEADSET_PATH, START_RECORDING_PATH,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::simulation;

const EVENT_CAPACITY: usize = 256;

type ApiResult = Result<Json<ControlReply>, (StatusCode, Json<ApiError>)>;

#[derive(Default)]
struct DeviceSession {
    connected: bool,
    selected: Option<HeadsetId>,
    recording: Option<JoinHandle<()>>,
    /// Bumped whenever a recording is started or torn down so a finishing
    /// task can tell whether it still owns the slot.
    generation: u64,
}

impl DeviceSession {
    fn cancel_recording(&mut self) -> bool {
        self.generation += 1;
        match self.recording.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.cancel_recording();
        self.connected = false;
        self.selected = None;
    }
}

pub struct AppState {
    session: Mutex<DeviceSession>,
    events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            session: Mutex::new(DeviceSession::default()),
            events,
        })
    }

    fn emit(&self, event: ServerEvent) {
        info!(kind = event.kind(), "mock: emitting event");
        let _ = self.events.send(event);
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(CONNECT_PATH, post(connect))
        .route(HEADSETS_PATH, get(list_headsets))
        .route(SELECT_HEADSET_PATH, post(select_headset))
        .route(START_RECORDING_PATH, post(start_recording))
        .route(RESTART_RECORDING_PATH, post(restart_recording))
        .route(DISCONNECT_PATH, post(disconnect))
        .route(EVENTS_PATH, get(ws_handler))
        .with_state(state)
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError::new(message)))
}

async fn connect(State(state): State<Arc<AppState>>) -> ApiResult {
    let mut session = state.session.lock().await;
    session.reset();
    session.connected = true;
    let headsets = simulation::catalogue();
    info!(found = headsets.len(), "mock: connected");
    Ok(Json(ControlReply::with_headsets(headsets)))
}

async fn list_headsets(State(state): State<Arc<AppState>>) -> ApiResult {
    if !state.session.lock().await.connected {
        return Err(bad_request("Connection not initiated."));
    }
    Ok(Json(ControlReply::with_headsets(simulation::catalogue())))
}

async fn select_headset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectHeadsetRequest>,
) -> ApiResult {
    let mut session = state.session.lock().await;
    if !session.connected {
        return Err(bad_request(
            "Missing headsetId or initial connection not made.",
        ));
    }
    if !simulation::catalogue()
        .iter()
        .any(|headset| headset.id == req.headset_id)
    {
        warn!(headset_id = %req.headset_id, "mock: unknown headset");
        return Err(bad_request(format!("Headset {} not found.", req.headset_id)));
    }
    info!(headset_id = %req.headset_id, "mock: headset selected");
    session.selected = Some(req.headset_id);
    Ok(Json(ControlReply::success_with_message(
        "Device connected and ready.",
    )))
}

async fn start_recording(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartRecordingRequest>,
) -> ApiResult {
    let mut session = state.session.lock().await;
    if session.selected.is_none() {
        return Err(bad_request("Device not connected."));
    }
    if session.recording.is_some() {
        return Err(bad_request("A recording is already in progress."));
    }
    if req.duration_seconds == 0 {
        return Err(bad_request("Recording duration must be positive."));
    }

    let duration = req.duration_seconds;
    session.generation += 1;
    let generation = session.generation;
    state.emit(ServerEvent::RecordingStarted { duration });

    let task_state = Arc::clone(&state);
    session.recording = Some(tokio::spawn(async move {
        let average = simulation::record(duration, &task_state.events).await;
        {
            let mut session = task_state.session.lock().await;
            if session.generation != generation {
                return;
            }
            session.recording = None;
        }
        info!(average, "mock: recording finished");
        task_state.emit(ServerEvent::RecordingEnded {
            average_score: f64::from(average),
        });
    }));
    info!(duration, "mock: recording started");
    Ok(Json(ControlReply::success()))
}

async fn restart_recording(State(state): State<Arc<AppState>>) -> ApiResult {
    let cancelled = state.session.lock().await.cancel_recording();
    if cancelled {
        state.emit(ServerEvent::RecordingCancelled {});
    } else {
        info!("mock: restart requested with no active recording");
    }
    Ok(Json(ControlReply::success_with_message(
        "Recording session cancelled.",
    )))
}

async fn disconnect(State(state): State<Arc<AppState>>) -> ApiResult {
    state.session.lock().await.reset();
    info!("mock: disconnected");
    Ok(Json(ControlReply::success()))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();
    info!("mock: event subscriber connected");

    let send_task = tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    warn!("mock: event subscriber left, resetting device session");
    state.session.lock().await.reset();
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
