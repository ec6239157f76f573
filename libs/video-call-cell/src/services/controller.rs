// libs/video-call-cell/src/services/controller.rs
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;

use crate::error::{CallError, DisconnectReason, SignalingError, TransportError};
use crate::models::{
    CallObservation, ConnectionStatus, MediaConstraints, MediaKind, MediaState, MediaStreamHandle, RoomId,
    SignalingEvent, TransportEvent, TransportState,
};
use crate::services::media::{MediaCapture, MediaDevices};
use crate::services::peer::{PeerConnectionManager, PeerTransportFactory, TransportEventSink};
use crate::services::signaling::SignalingClient;
use crate::services::timer::CallTimer;
use crate::session::{CallRequest, Session};

/// The three collaborators a controller drives.
#[derive(Clone)]
pub struct CallServices {
    pub signaling: Arc<dyn SignalingClient>,
    pub devices: Arc<dyn MediaDevices>,
    pub transports: Arc<dyn PeerTransportFactory>,
}

#[derive(Debug, Clone)]
pub struct CallSettings {
    pub constraints: MediaConstraints,
    pub timer_tick: Duration,
    pub signaling_timeout: Duration,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            constraints: MediaConstraints::default(),
            timer_tick: Duration::from_secs(1),
            signaling_timeout: Duration::from_secs(10),
        }
    }
}

impl CallSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            constraints: MediaConstraints {
                audio: config.capture_audio,
                video: config.capture_video,
            },
            timer_tick: Duration::from_millis(config.call_timer_tick_ms.max(1)),
            signaling_timeout: Duration::from_secs(config.signaling_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Start,
    End,
    Toggle(MediaKind, bool),
}

enum ControllerInput {
    Command(Command),
    MediaAcquired {
        generation: u64,
        capture: MediaCapture,
        result: Result<MediaStreamHandle, CallError>,
    },
    JoinCompleted {
        generation: u64,
        result: Result<(), CallError>,
    },
    Signaling {
        generation: u64,
        event: SignalingEvent,
    },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    Tick {
        generation: u64,
    },
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Drives one appointment's call from `idle` through negotiation to teardown.
///
/// All state lives in a single task; the methods here only enqueue commands
/// and never wait for their outcome. Observe progress through [`subscribe`].
/// Dropping the controller tears down any live session.
///
/// [`subscribe`]: CallSessionController::subscribe
pub struct CallSessionController {
    inbox: mpsc::UnboundedSender<ControllerInput>,
    observation: watch::Receiver<CallObservation>,
    room_id: RoomId,
}

impl CallSessionController {
    /// Must be called from within a tokio runtime.
    pub fn new(request: CallRequest, services: CallServices, settings: CallSettings) -> Result<Self, CallError> {
        request.validate()?;

        let room_id = request.room_id();
        let (inbox, receiver) = mpsc::unbounded_channel();
        let (publisher, observation) = watch::channel(CallObservation::default());

        let actor = ControllerActor {
            request,
            services,
            settings,
            inbox: inbox.clone(),
            observation: publisher,
            generation: 0,
            media_state: MediaState::default(),
            runtime: None,
            pending_leave: None,
        };
        tokio::spawn(actor.run(receiver));

        info!("Call controller created for room {}", room_id);
        Ok(Self {
            inbox,
            observation,
            room_id,
        })
    }

    pub fn start(&self) {
        self.send(ControllerInput::Command(Command::Start));
    }

    pub fn end(&self) {
        self.send(ControllerInput::Command(Command::End));
    }

    pub fn toggle_audio(&self, enabled: bool) {
        self.send(ControllerInput::Command(Command::Toggle(MediaKind::Audio, enabled)));
    }

    pub fn toggle_video(&self, enabled: bool) {
        self.send(ControllerInput::Command(Command::Toggle(MediaKind::Video, enabled)));
    }

    /// Resolves once every command sent before it has been applied.
    pub async fn sync(&self) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(ControllerInput::Barrier(tx))
            .map_err(|_| CallError::ControllerStopped)?;
        rx.await.map_err(|_| CallError::ControllerStopped)
    }

    pub fn observation(&self) -> CallObservation {
        self.observation.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallObservation> {
        self.observation.clone()
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    fn send(&self, input: ControllerInput) {
        if self.inbox.send(input).is_err() {
            warn!("Call controller for room {} is no longer running", self.room_id);
        }
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        let _ = self.inbox.send(ControllerInput::Shutdown);
    }
}

// ==============================================================================
// CONTROLLER TASK
// ==============================================================================

/// Resources owned by one generation. Dropped as a unit on teardown.
struct SessionRuntime {
    session: Session,
    media: Option<MediaCapture>,
    peer: Option<PeerConnectionManager>,
    timer: CallTimer,
    forwarder: Option<JoinHandle<()>>,
    join: Option<JoinHandle<bool>>,
    joined: bool,
    offer_sent: bool,
    call_started: bool,
}

struct ControllerActor {
    request: CallRequest,
    services: CallServices,
    settings: CallSettings,
    inbox: mpsc::UnboundedSender<ControllerInput>,
    observation: watch::Sender<CallObservation>,
    generation: u64,
    media_state: MediaState,
    runtime: Option<SessionRuntime>,
    /// Leave owed by a superseded session whose join was still in flight.
    pending_leave: Option<JoinHandle<()>>,
}

impl ControllerActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<ControllerInput>) {
        while let Some(input) = receiver.recv().await {
            match input {
                ControllerInput::Command(Command::Start) => self.handle_start(),
                ControllerInput::Command(Command::End) => self.handle_end().await,
                ControllerInput::Command(Command::Toggle(kind, enabled)) => self.handle_toggle(kind, enabled),
                ControllerInput::MediaAcquired {
                    generation,
                    capture,
                    result,
                } => self.handle_media_acquired(generation, capture, result).await,
                ControllerInput::JoinCompleted { generation, result } => {
                    self.handle_join_completed(generation, result).await
                }
                ControllerInput::Signaling { generation, event } => {
                    self.handle_signaling_event(generation, event).await
                }
                ControllerInput::Transport { generation, event } => {
                    self.handle_transport_event(generation, event).await
                }
                ControllerInput::Tick { generation } => self.handle_tick(generation),
                ControllerInput::Barrier(done) => {
                    let _ = done.send(());
                }
                ControllerInput::Shutdown => {
                    self.handle_end().await;
                    break;
                }
            }
        }

        debug!("Call controller task for {} stopped", self.request.room_id());
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.runtime.is_some()
    }

    fn status(&self) -> ConnectionStatus {
        self.observation.borrow().status
    }

    fn call_started(&self) -> bool {
        self.runtime.as_ref().map(|r| r.call_started).unwrap_or(false)
    }

    /// Publishes only when the closure actually changed something.
    fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut CallObservation),
    {
        self.observation.send_if_modified(|observation| {
            let before = observation.clone();
            apply(observation);
            *observation != before
        });
    }

    // --------------------------------------------------------------------------
    // Commands
    // --------------------------------------------------------------------------

    #[instrument(skip(self), fields(room = %self.request.room_id()))]
    fn handle_start(&mut self) {
        let status = self.status();
        if status != ConnectionStatus::Idle {
            debug!("Ignoring start while {}", status);
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let session = Session::open(&self.request, generation);
        info!(
            "Starting call generation {} as {} in room {}",
            generation, session.local.role, session.room_id
        );

        let room_id = session.room_id.clone();
        self.update(|o| {
            o.status = ConnectionStatus::Connecting;
            o.last_error = None;
            o.call_started = false;
            o.duration_seconds = 0;
            o.room_id = Some(room_id);
        });

        // Media first: the room only hears about us once we can produce media.
        let mut capture = MediaCapture::new(self.services.devices.clone()).with_state(self.media_state);
        let constraints = self.settings.constraints;
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = capture.acquire(&constraints).await;
            // A closed inbox hands the input back; dropping it releases the capture.
            let _ = inbox.send(ControllerInput::MediaAcquired {
                generation,
                capture,
                result,
            });
        });

        self.runtime = Some(SessionRuntime {
            session,
            media: None,
            peer: None,
            timer: CallTimer::new(self.settings.timer_tick),
            forwarder: None,
            join: None,
            joined: false,
            offer_sent: false,
            call_started: false,
        });
    }

    #[instrument(skip(self), fields(room = %self.request.room_id(), generation = self.generation))]
    async fn handle_end(&mut self) {
        self.generation += 1;
        let had_session = self.runtime.is_some();

        self.release_runtime().await;
        self.update(|o| {
            o.status = ConnectionStatus::Idle;
            o.call_started = false;
            o.duration_seconds = 0;
            o.local_stream = None;
            o.remote_stream = None;
            o.last_error = None;
            o.room_id = None;
        });

        if had_session {
            info!("Call ended");
        } else {
            debug!("End requested with no live session");
        }
    }

    fn handle_toggle(&mut self, kind: MediaKind, enabled: bool) {
        self.media_state.set(kind, enabled);

        if let Some(media) = self.runtime.as_mut().and_then(|r| r.media.as_mut()) {
            media.set_track_enabled(kind, enabled);
        }

        debug!("Local {} {}", kind, if enabled { "enabled" } else { "disabled" });
        self.update(|o| match kind {
            MediaKind::Audio => o.audio_enabled = enabled,
            MediaKind::Video => o.video_enabled = enabled,
        });
    }

    // --------------------------------------------------------------------------
    // Asynchronous results
    // --------------------------------------------------------------------------

    #[instrument(skip(self, capture, result), fields(room = %self.request.room_id()))]
    async fn handle_media_acquired(
        &mut self,
        generation: u64,
        mut capture: MediaCapture,
        result: Result<MediaStreamHandle, CallError>,
    ) {
        if !self.is_current(generation) {
            debug!("Discarding media acquired for superseded generation {}", generation);
            capture.release();
            return;
        }

        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(e).await;
                return;
            }
        };

        // Toggles issued while acquisition was outstanding.
        for kind in handle.kinds() {
            capture.set_track_enabled(*kind, self.media_state.is_enabled(*kind));
        }

        let local = handle.clone();
        self.update(|o| o.local_stream = Some(local));

        if let Some(runtime) = self.runtime.as_mut() {
            runtime.media = Some(capture);
        }

        if let Err(e) = self.connect_transport(generation, &handle).await {
            self.fail(e).await;
            return;
        }

        self.subscribe_signaling(generation);
        self.join_room(generation);
    }

    async fn connect_transport(&mut self, generation: u64, local: &MediaStreamHandle) -> Result<(), CallError> {
        let inbox = self.inbox.clone();
        let sink: TransportEventSink = Arc::new(move |event: TransportEvent| {
            let _ = inbox.send(ControllerInput::Transport { generation, event });
        });

        let transport = self.services.transports.create(sink).await?;
        let Some(runtime) = self.runtime.as_mut() else {
            let _ = transport.close().await;
            return Err(TransportError::Closed.into());
        };

        let peer = runtime
            .peer
            .insert(PeerConnectionManager::new(
                runtime.session.room_id.clone(),
                transport,
                self.services.signaling.clone(),
            ));
        peer.attach_local_stream(local).await
    }

    fn subscribe_signaling(&mut self, generation: u64) {
        let mut events = self.services.signaling.subscribe();
        let inbox = self.inbox.clone();

        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if inbox.send(ControllerInput::Signaling { generation, event }).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Signaling event stream lagged, {} events dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(runtime) = self.runtime.as_mut() {
            runtime.forwarder = Some(forwarder);
        }
    }

    fn join_room(&mut self, generation: u64) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };

        let signaling = self.services.signaling.clone();
        let room = runtime.session.room_id.clone();
        let participant = runtime.session.local.clone();
        let limit = self.settings.signaling_timeout;
        let inbox = self.inbox.clone();
        let previous = self.pending_leave.take();

        runtime.join = Some(tokio::spawn(async move {
            // The shared client must be out of the old room before it enters this one.
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = match time::timeout(limit, signaling.join_room(&room, &participant)).await {
                Ok(result) => result.map_err(CallError::from),
                Err(_) => Err(SignalingError::Timeout {
                    seconds: limit.as_secs(),
                }
                .into()),
            };
            let joined = result.is_ok();
            let _ = inbox.send(ControllerInput::JoinCompleted { generation, result });
            joined
        }));
        debug!("Joining signaling room");
    }

    #[instrument(skip(self, result), fields(room = %self.request.room_id()))]
    async fn handle_join_completed(&mut self, generation: u64, result: Result<(), CallError>) {
        if !self.is_current(generation) {
            debug!("Ignoring join result for superseded generation {}", generation);
            return;
        }

        if let Err(e) = result {
            self.fail(e).await;
            return;
        }

        if let Some(runtime) = self.runtime.as_mut() {
            runtime.joined = true;
        }

        info!("Joined room, ready to negotiate");
        self.update(|o| {
            if o.status == ConnectionStatus::Connecting {
                o.status = ConnectionStatus::Connected;
                o.last_error = None;
            }
        });
    }

    #[instrument(skip(self, event), fields(room = %self.request.room_id(), event = event.name()))]
    async fn handle_signaling_event(&mut self, generation: u64, event: SignalingEvent) {
        if !self.is_current(generation) {
            debug!("Ignoring signaling event for superseded generation {}", generation);
            return;
        }

        let status = self.status();
        if !matches!(status, ConnectionStatus::Connecting | ConnectionStatus::Connected) {
            debug!("Ignoring signaling event while {}", status);
            return;
        }

        match event {
            SignalingEvent::PeerJoined { participant } => {
                info!("{} ({}) joined the room", participant.display_name, participant.role);
                self.on_peer_joined().await;
            }
            SignalingEvent::PeerLeft { user_id } => {
                info!("Participant {} left the room", user_id);
                self.mark_disconnected(DisconnectReason::RemoteLeft);
            }
            SignalingEvent::OfferReceived { description } | SignalingEvent::AnswerReceived { description } => {
                let result = match self.peer_mut() {
                    Some(peer) => peer.apply_remote_description(description).await,
                    None => Err(TransportError::Closed.into()),
                };
                if let Err(e) = result {
                    self.negotiation_failed(e).await;
                }
            }
            SignalingEvent::CandidateReceived { candidate } => {
                let result = match self.peer_mut() {
                    Some(peer) => peer.add_remote_candidate(candidate).await,
                    None => Err(TransportError::Closed.into()),
                };
                if let Err(e) = result {
                    self.negotiation_failed(e).await;
                }
            }
        }
    }

    async fn on_peer_joined(&mut self) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };

        if !runtime.session.is_initiator() {
            debug!("Waiting for the initiator's offer");
            return;
        }
        if runtime.offer_sent {
            debug!("Offer already sent for this session");
            return;
        }
        runtime.offer_sent = true;

        let result = match runtime.peer.as_mut() {
            Some(peer) => peer.create_offer().await,
            None => Err(TransportError::Closed.into()),
        };
        if let Err(e) = result {
            self.negotiation_failed(e).await;
        }
    }

    #[instrument(skip(self, event), fields(room = %self.request.room_id()))]
    async fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if !self.is_current(generation) {
            debug!("Ignoring transport event for superseded generation {}", generation);
            return;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let result = match self.peer_mut() {
                    Some(peer) => peer.relay_local_candidate(&candidate).await,
                    None => Ok(()),
                };
                if let Err(e) = result {
                    self.negotiation_failed(e).await;
                }
            }
            TransportEvent::RemoteStream(stream) => self.on_remote_stream(generation, stream),
            TransportEvent::StateChanged(state) => self.on_transport_state(state).await,
        }
    }

    fn on_remote_stream(&mut self, generation: u64, stream: MediaStreamHandle) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        let Some(stream) = runtime.peer.as_mut().and_then(|peer| peer.accept_remote_stream(stream)) else {
            return;
        };

        let first = !runtime.call_started;
        if first {
            runtime.call_started = true;
            let inbox = self.inbox.clone();
            runtime.timer.start(move || {
                let _ = inbox.send(ControllerInput::Tick { generation });
            });
            info!("Remote media flowing, call is live");
        }

        self.update(|o| {
            o.remote_stream = Some(stream);
            if first {
                o.call_started = true;
                o.duration_seconds = 0;
            }
        });
    }

    async fn on_transport_state(&mut self, state: TransportState) {
        debug!("Transport state changed to {:?}", state);
        let call_started = self.call_started();

        match state {
            TransportState::Connected => {
                self.update(|o| {
                    if o.status == ConnectionStatus::Disconnected && call_started {
                        info!("Transport recovered");
                        o.status = ConnectionStatus::Connected;
                        o.last_error = None;
                    }
                });
            }
            TransportState::Disconnected | TransportState::Failed if call_started => {
                self.mark_disconnected(DisconnectReason::TransportLost);
            }
            TransportState::Failed => {
                self.fail(TransportError::ConnectionFailed.into()).await;
            }
            TransportState::Disconnected => {
                warn!("Transport disconnected before media arrived, waiting for recovery");
            }
            TransportState::New | TransportState::Connecting | TransportState::Closed => {}
        }
    }

    fn handle_tick(&mut self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        if !runtime.timer.is_running() {
            return;
        }

        let elapsed = runtime.timer.elapsed_seconds();
        self.update(|o| o.duration_seconds = elapsed);
    }

    // --------------------------------------------------------------------------
    // Failure and teardown
    // --------------------------------------------------------------------------

    fn peer_mut(&mut self) -> Option<&mut PeerConnectionManager> {
        self.runtime.as_mut().and_then(|r| r.peer.as_mut())
    }

    fn mark_disconnected(&mut self, reason: DisconnectReason) {
        let message = CallError::PeerDisconnected { reason }.user_message();
        warn!("Peer disconnected: {}", reason);
        self.update(|o| {
            o.status = ConnectionStatus::Disconnected;
            o.last_error = Some(message.to_string());
        });
    }

    /// Negotiation errors only end the session before media has arrived.
    async fn negotiation_failed(&mut self, err: CallError) {
        if self.call_started() {
            warn!("Negotiation error during live call: {}", err);
            return;
        }
        self.fail(err).await;
    }

    async fn fail(&mut self, err: CallError) {
        error!("Call failed: {}", err);
        self.release_runtime().await;

        let message = err.user_message();
        self.update(|o| {
            o.status = ConnectionStatus::Failed;
            o.last_error = Some(message.to_string());
            o.call_started = false;
            o.duration_seconds = 0;
            o.local_stream = None;
            o.remote_stream = None;
        });
    }

    /// Stops the timer, closes the transport, releases media, then leaves the room.
    async fn release_runtime(&mut self) {
        let Some(mut runtime) = self.runtime.take() else {
            return;
        };

        runtime.timer.stop();
        if let Some(mut peer) = runtime.peer.take() {
            peer.close().await;
        }
        if let Some(mut media) = runtime.media.take() {
            media.release();
        }
        if let Some(forwarder) = runtime.forwarder.take() {
            forwarder.abort();
        }

        if let Some(join) = runtime.join.take() {
            let signaling = self.services.signaling.clone();
            let limit = self.settings.signaling_timeout;

            if runtime.joined {
                leave_room(signaling, limit).await;
            } else {
                // Join still in flight: leave once it lands. The next join waits for this.
                self.pending_leave = Some(tokio::spawn(async move {
                    if matches!(join.await, Ok(true)) {
                        leave_room(signaling, limit).await;
                    }
                }));
            }
        }

        debug!("Released resources of generation {}", runtime.session.generation);
    }
}

async fn leave_room(signaling: Arc<dyn SignalingClient>, limit: Duration) {
    match time::timeout(limit, signaling.leave_room()).await {
        Ok(Ok(())) => debug!("Left signaling room"),
        Ok(Err(e)) => warn!("Failed to leave signaling room: {}", e),
        Err(_) => warn!("Leaving signaling room timed out after {:?}", limit),
    }
}
