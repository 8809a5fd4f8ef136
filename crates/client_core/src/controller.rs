//! The session state machine.
//!
//! Operator commands, request completions, discovery reports, countdown ticks
//! and channel events all arrive as [`ControllerInput`]s on one queue and are
//! applied one at a time, so nothing else ever mutates [`SessionState`].
//! Transitions that reflect device truth (recording running, ended, cancelled)
//! are driven only by channel events, never by the acknowledgement of the
//! request that asked for them.

use std::{future::Future, ops::ControlFlow, sync::Arc, time::Duration};

use shared::domain::{HeadsetDescriptor, HeadsetId};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    countdown::{CountdownTick, CountdownTimer},
    discovery::{DiscoveryOutcome, DiscoveryPoller, DiscoveryReport, DiscoverySettings},
    epoch::{Epoch, EpochCounter},
    error::{GatewayError, SessionError},
    event_channel::{ChannelEvent, ChannelHandle, ChannelSignal, EventChannel, EventChannelConnector},
    gateway::{validate_duration, CommandGateway, ControlOp},
    throttle::{Throttle, DEFAULT_THROTTLE_INTERVAL},
    types::{
        format_clock, NoticeKind, RecordingSession, ResultsSummary, SessionSnapshot,
        SessionState, SessionUpdate,
    },
};

const UPDATE_CAPACITY: usize = 256;
const CONNECTION_LOST_MESSAGE: &str = "Connection to the device service was lost.";
const NOTHING_FOUND_MESSAGE: &str =
    "No headsets found. Make sure the headset is switched on, then search again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub discovery: DiscoverySettings,
    pub score_throttle: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            discovery: DiscoverySettings::default(),
            score_throttle: DEFAULT_THROTTLE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Connect,
    SelectHeadset(HeadsetId),
    StartRecording(i64),
    RestartRecording,
    NewRecording,
    Rescan,
    Disconnect,
    /// Disconnect without waiting on the service, then stop the controller.
    Leave,
}

#[derive(Debug)]
pub enum ControllerInput {
    Command(SessionCommand),
    Connected {
        epoch: Epoch,
        result: Result<(), GatewayError>,
    },
    HeadsetSelected {
        epoch: Epoch,
        headset_id: HeadsetId,
        result: Result<(), GatewayError>,
    },
    /// Acknowledgement of start/restart. Confirms acceptance only.
    RecordingRequestSettled {
        epoch: Epoch,
        op: ControlOp,
        result: Result<(), GatewayError>,
    },
    Discovery(DiscoveryReport),
    Countdown(CountdownTick),
    Channel(ChannelSignal),
}

pub struct SessionController {
    state: SessionState,
    gateway: Arc<dyn CommandGateway>,
    poller: DiscoveryPoller,
    timer: CountdownTimer,
    throttle: Throttle,
    channel: EventChannel,
    channel_handle: Option<ChannelHandle>,
    headsets: Vec<HeadsetDescriptor>,
    recording: Option<RecordingSession>,
    results: Option<ResultsSummary>,
    /// Advanced on every return to `Disconnected`; request completions from an
    /// older session are dropped.
    requests: EpochCounter,
    farewell: Option<JoinHandle<()>>,
    inputs: mpsc::UnboundedSender<ControllerInput>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionController {
    pub fn new(
        gateway: Arc<dyn CommandGateway>,
        connector: Arc<dyn EventChannelConnector>,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerInput>) {
        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let controller = Self {
            state: SessionState::Disconnected,
            gateway,
            poller: DiscoveryPoller::new(settings.discovery),
            timer: CountdownTimer::new(),
            throttle: Throttle::new(settings.score_throttle),
            channel: EventChannel::new(connector),
            channel_handle: None,
            headsets: Vec::new(),
            recording: None,
            results: None,
            requests: EpochCounter::new(),
            farewell: None,
            inputs,
            updates,
        };
        (controller, inputs_rx)
    }

    pub fn session_handle(&self) -> SessionHandle {
        SessionHandle {
            inputs: self.inputs.clone(),
            updates: self.updates.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            headsets: self.headsets.clone(),
            recording: self.recording.clone(),
            results: self.results,
        }
    }

    /// Applies inputs until a `Leave` command arrives. Returns the detached
    /// disconnect request, if one is still in flight, so a caller that is
    /// about to exit may give it a moment.
    pub async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<ControllerInput>,
    ) -> Option<JoinHandle<()>> {
        info!("session: controller running");
        while let Some(input) = inputs.recv().await {
            if self.apply(input).is_break() {
                break;
            }
        }
        info!("session: controller stopped");
        self.farewell.take()
    }

    pub fn apply(&mut self, input: ControllerInput) -> ControlFlow<()> {
        match input {
            ControllerInput::Command(command) => return self.command(command),
            ControllerInput::Connected { epoch, result } => self.on_connected(epoch, result),
            ControllerInput::HeadsetSelected {
                epoch,
                headset_id,
                result,
            } => self.on_headset_selected(epoch, headset_id, result),
            ControllerInput::RecordingRequestSettled { epoch, op, result } => {
                self.on_recording_request_settled(epoch, op, result)
            }
            ControllerInput::Discovery(report) => self.on_discovery(report),
            ControllerInput::Countdown(tick) => self.on_countdown(tick),
            ControllerInput::Channel(signal) => {
                if !self.channel.is_current(signal.epoch) {
                    debug!(epoch = signal.epoch.value(), "session: dropping stale channel signal");
                } else {
                    self.on_event(signal.event);
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn command(&mut self, command: SessionCommand) -> ControlFlow<()> {
        let outcome = match command {
            SessionCommand::Connect => self.request_connect(),
            SessionCommand::SelectHeadset(headset_id) => self.request_select_headset(headset_id),
            SessionCommand::StartRecording(duration) => self.request_start_recording(duration),
            SessionCommand::RestartRecording => self.request_restart_recording(),
            SessionCommand::NewRecording => self.request_new_recording(),
            SessionCommand::Rescan => self.request_rescan(),
            SessionCommand::Disconnect => {
                self.request_disconnect();
                Ok(())
            }
            SessionCommand::Leave => {
                self.leave();
                return ControlFlow::Break(());
            }
        };
        if let Err(err) = outcome {
            self.reject(err);
        }
        ControlFlow::Continue(())
    }

    pub fn request_connect(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Disconnected, "connect")?;
        self.transition(SessionState::Connecting);
        let gateway = Arc::clone(&self.gateway);
        let epoch = self.requests.current();
        self.dispatch(async move {
            ControllerInput::Connected {
                epoch,
                result: gateway.connect().await,
            }
        });
        Ok(())
    }

    pub fn request_select_headset(&mut self, headset_id: HeadsetId) -> Result<(), SessionError> {
        self.require(SessionState::SelectingHeadset, "select a headset")?;
        if !self.headsets.iter().any(|headset| headset.id == headset_id) {
            return Err(SessionError::UnknownHeadset(headset_id));
        }
        self.poller.stop();
        self.headsets.clear();
        self.transition(SessionState::ConnectingHeadset);

        let gateway = Arc::clone(&self.gateway);
        let epoch = self.requests.current();
        self.dispatch(async move {
            let result = gateway.select_headset(&headset_id).await;
            ControllerInput::HeadsetSelected {
                epoch,
                headset_id,
                result,
            }
        });
        Ok(())
    }

    pub fn request_start_recording(&mut self, duration_seconds: i64) -> Result<(), SessionError> {
        self.require(SessionState::Ready, "start a recording")?;
        let duration_seconds = validate_duration(duration_seconds).map_err(|_| {
            if duration_seconds <= 0 {
                SessionError::NonPositiveDuration
            } else {
                SessionError::DurationTooLong(duration_seconds)
            }
        })?;

        let gateway = Arc::clone(&self.gateway);
        let epoch = self.requests.current();
        info!(duration_seconds, "session: requesting recording");
        self.dispatch(async move {
            ControllerInput::RecordingRequestSettled {
                epoch,
                op: ControlOp::StartRecording,
                result: gateway.start_recording(duration_seconds).await,
            }
        });
        Ok(())
    }

    pub fn request_restart_recording(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Results, "restart the recording")?;
        let gateway = Arc::clone(&self.gateway);
        let epoch = self.requests.current();
        self.dispatch(async move {
            ControllerInput::RecordingRequestSettled {
                epoch,
                op: ControlOp::RestartRecording,
                result: gateway.restart_recording().await,
            }
        });
        Ok(())
    }

    /// Leaves the results screen for a fresh recording. Local only.
    pub fn request_new_recording(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Results, "begin a new recording")?;
        self.results = None;
        self.transition(SessionState::Ready);
        Ok(())
    }

    pub fn request_rescan(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::SelectingHeadset, "search for headsets")?;
        self.start_discovery();
        Ok(())
    }

    /// Valid from every state. The service is told without waiting for, or
    /// caring about, its answer.
    pub fn request_disconnect(&mut self) {
        self.teardown();
        self.transition(SessionState::Disconnected);
        self.send_farewell();
    }

    fn leave(&mut self) {
        info!("session: leaving");
        self.request_disconnect();
    }

    /// Inbound handler for channel events already matched to the open channel.
    pub fn on_event(&mut self, event: ChannelEvent) {
        match (self.state, event) {
            (SessionState::Ready, ChannelEvent::RecordingStarted { duration }) => {
                self.begin_recording(duration)
            }
            (SessionState::Recording, ChannelEvent::NewScore { score }) => {
                if let Some(score) = self.throttle.emit(score) {
                    if let Some(recording) = self.recording.as_mut() {
                        recording.latest_score = Some(score);
                    }
                    self.publish(SessionUpdate::Score(score));
                }
            }
            (SessionState::Recording, ChannelEvent::RecordingEnded { average_score }) => {
                self.timer.stop();
                self.recording = None;
                let summary = ResultsSummary { average_score };
                self.results = Some(summary);
                self.transition(SessionState::Results);
                self.publish(SessionUpdate::Results(summary));
            }
            (SessionState::Recording, ChannelEvent::RecordingCancelled) => {
                self.timer.stop();
                self.recording = None;
                self.transition(SessionState::Ready);
                self.notice(NoticeKind::Info, "Recording cancelled.");
            }
            (state, ChannelEvent::ServerDisconnected { message }) if state.has_channel() => {
                warn!(%message, "session: service ended the session");
                self.teardown();
                self.transition(SessionState::Disconnected);
                self.notice(NoticeKind::Error, message);
            }
            (state, ChannelEvent::Closed) if state.has_channel() => {
                warn!(%state, "session: event channel lost");
                self.teardown();
                self.transition(SessionState::Disconnected);
                self.notice(NoticeKind::Error, CONNECTION_LOST_MESSAGE);
            }
            (state, event) => {
                debug!(%state, ?event, "session: event not applicable, ignoring");
            }
        }
    }

    fn on_connected(&mut self, epoch: Epoch, result: Result<(), GatewayError>) {
        if !self.is_live_request(epoch, SessionState::Connecting) {
            debug!("session: dropping late connect result");
            return;
        }
        match result {
            Ok(()) => {
                self.transition(SessionState::SelectingHeadset);
                self.start_discovery();
            }
            Err(err) => self.fail_to_disconnected(err),
        }
    }

    fn on_headset_selected(
        &mut self,
        epoch: Epoch,
        headset_id: HeadsetId,
        result: Result<(), GatewayError>,
    ) {
        if !self.is_live_request(epoch, SessionState::ConnectingHeadset) {
            debug!(%headset_id, "session: dropping late select-headset result");
            return;
        }
        match result {
            Ok(()) => {
                info!(%headset_id, "session: headset ready");
                self.transition(SessionState::Ready);
                self.open_channel();
            }
            Err(err) => self.fail_to_disconnected(err),
        }
    }

    fn on_recording_request_settled(
        &mut self,
        epoch: Epoch,
        op: ControlOp,
        result: Result<(), GatewayError>,
    ) {
        // Once the service's own events have moved the session on, the
        // acknowledgement has nothing left to say.
        let expected = match op {
            ControlOp::RestartRecording => SessionState::Results,
            _ => SessionState::Ready,
        };
        if !self.is_live_request(epoch, expected) {
            debug!(op = op.name(), state = %self.state, "session: dropping late recording request result");
            return;
        }
        match result {
            Ok(()) => debug!(op = op.name(), "session: request accepted, awaiting events"),
            Err(err) => {
                warn!(op = op.name(), error = %err, "session: request failed");
                self.notice(NoticeKind::Error, err.user_message());
            }
        }
    }

    fn on_discovery(&mut self, report: DiscoveryReport) {
        if !self.poller.is_current(report.epoch) || self.state != SessionState::SelectingHeadset {
            debug!(epoch = report.epoch.value(), "session: dropping stale discovery report");
            return;
        }
        match report.outcome {
            DiscoveryOutcome::Found(headsets) => {
                self.headsets = headsets.clone();
                self.publish(SessionUpdate::HeadsetsFound(headsets));
            }
            DiscoveryOutcome::Exhausted { .. } => {
                self.headsets.clear();
                self.publish(SessionUpdate::NoHeadsetsFound);
                self.notice(NoticeKind::Info, NOTHING_FOUND_MESSAGE);
            }
        }
    }

    fn on_countdown(&mut self, tick: CountdownTick) {
        if !self.timer.is_current(tick.epoch) || self.state != SessionState::Recording {
            debug!(epoch = tick.epoch.value(), "session: dropping stale countdown tick");
            return;
        }
        if let Some(recording) = self.recording.as_mut() {
            recording.remaining_seconds = tick.remaining;
        }
        self.publish(SessionUpdate::Countdown {
            remaining: tick.remaining,
            display: format_clock(tick.remaining),
        });
    }

    fn begin_recording(&mut self, duration: u32) {
        if duration == 0 {
            warn!("session: service started a recording with zero duration");
        }
        self.recording = Some(RecordingSession::new(duration));
        self.throttle.reset();
        let inputs = self.inputs.clone();
        self.timer.start(duration, move |tick| {
            let _ = inputs.send(ControllerInput::Countdown(tick));
        });
        self.transition(SessionState::Recording);
        self.publish(SessionUpdate::Countdown {
            remaining: duration,
            display: format_clock(duration),
        });
    }

    fn start_discovery(&mut self) {
        self.headsets.clear();
        let inputs = self.inputs.clone();
        self.poller.start(Arc::clone(&self.gateway), move |report| {
            let _ = inputs.send(ControllerInput::Discovery(report));
        });
    }

    fn open_channel(&mut self) {
        let inputs = self.inputs.clone();
        let handle = self.channel.open(move |signal| {
            let _ = inputs.send(ControllerInput::Channel(signal));
        });
        self.channel_handle = Some(handle);
    }

    /// Stops every owned activity and drops all per-session data. Anything
    /// still in flight becomes stale.
    fn teardown(&mut self) {
        self.poller.stop();
        self.timer.stop();
        if let Some(handle) = self.channel_handle.take() {
            self.channel.close(handle);
        }
        self.headsets.clear();
        self.recording = None;
        self.results = None;
        self.requests.advance();
    }

    fn fail_to_disconnected(&mut self, err: GatewayError) {
        warn!(op = err.op().name(), error = %err, "session: request failed");
        self.teardown();
        self.transition(SessionState::Disconnected);
        self.notice(NoticeKind::Error, err.user_message());
    }

    fn send_farewell(&mut self) {
        let gateway = Arc::clone(&self.gateway);
        self.farewell = Some(tokio::spawn(async move {
            if let Err(err) = gateway.disconnect().await {
                debug!(error = %err, "session: disconnect request failed, ignoring");
            }
        }));
    }

    fn is_live_request(&self, epoch: Epoch, expected: SessionState) -> bool {
        self.requests.is_current(epoch) && self.state == expected
    }

    fn require(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidInState {
                action,
                state: self.state,
            })
        }
    }

    fn dispatch<Fut>(&self, request: Fut)
    where
        Fut: Future<Output = ControllerInput> + Send + 'static,
    {
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let _ = inputs.send(request.await);
        });
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(%from, %to, "session: state changed");
        self.publish(SessionUpdate::StateChanged { from, to });
    }

    fn reject(&self, err: SessionError) {
        warn!(error = %err, "session: action rejected");
        self.notice(NoticeKind::Rejected, err.to_string());
    }

    fn notice(&self, kind: NoticeKind, message: impl Into<String>) {
        self.publish(SessionUpdate::Notice {
            kind,
            message: message.into(),
        });
    }

    fn publish(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }
}

/// Cloneable front door for the operator-facing layer. Every call only
/// enqueues; the controller decides what, if anything, happens.
#[derive(Clone)]
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<ControllerInput>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.inputs
            .send(ControllerInput::Command(command))
            .map_err(|_| SessionError::ControllerStopped)
    }

    pub fn request_connect(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Connect)
    }

    pub fn request_select_headset(&self, headset_id: HeadsetId) -> Result<(), SessionError> {
        self.send(SessionCommand::SelectHeadset(headset_id))
    }

    pub fn request_start_recording(&self, duration_seconds: i64) -> Result<(), SessionError> {
        self.send(SessionCommand::StartRecording(duration_seconds))
    }

    pub fn request_restart_recording(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::RestartRecording)
    }

    pub fn request_new_recording(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::NewRecording)
    }

    pub fn request_rescan(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Rescan)
    }

    pub fn request_disconnect(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Disconnect)
    }

    pub fn leave(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Leave)
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
