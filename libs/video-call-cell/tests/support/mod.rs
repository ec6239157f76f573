// Shared fakes for the video-call-cell integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use shared_models::{AppointmentStatus, ParticipantInfo, ParticipantRole};
use shared_utils::test_utils::{TestAppointment, TestConfig, TestParticipant};
use video_call_cell::{
    CallRequest, CallServices, CallSessionController, CallSettings, CapturedStream, DeviceError, IceCandidate,
    MediaConstraints, MediaDevices, MediaKind, MediaState, MediaStreamHandle, PeerTransport, PeerTransportFactory,
    RoomId, SessionDescription, SignalingClient, SignalingError, SignalingEvent, StreamId, TransportError,
    TransportEvent, TransportEventSink, TransportState,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Lets every ready task run. Only meaningful with paused time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ==============================================================================
// DEVICES
// ==============================================================================

#[derive(Default)]
pub struct FakeDevices {
    denied: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    opened: AtomicUsize,
    stopped: Arc<AtomicUsize>,
    tracks: Arc<Mutex<MediaState>>,
}

impl FakeDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny_permission(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    /// Holds every `open` until the returned notify fires.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Enabled flags of the live capture tracks.
    pub fn track_state(&self) -> MediaState {
        *self.tracks.lock().unwrap()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn open(&self, constraints: &MediaConstraints) -> Result<Box<dyn CapturedStream>, DeviceError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.denied.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied);
        }

        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        *self.tracks.lock().unwrap() = MediaState::default();
        Ok(Box::new(FakeStream {
            handle: MediaStreamHandle::detached(StreamId::new(format!("local-{}", n)), constraints.kinds()),
            stopped: self.stopped.clone(),
            tracks: self.tracks.clone(),
        }))
    }
}

struct FakeStream {
    handle: MediaStreamHandle,
    stopped: Arc<AtomicUsize>,
    tracks: Arc<Mutex<MediaState>>,
}

impl CapturedStream for FakeStream {
    fn handle(&self) -> MediaStreamHandle {
        self.handle.clone()
    }

    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool {
        if !self.handle.has_kind(kind) {
            return false;
        }
        self.tracks.lock().unwrap().set(kind, enabled);
        true
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

// ==============================================================================
// TRANSPORTS
// ==============================================================================

/// Everything the fake transports were asked to do, in order.
#[derive(Default, Debug)]
pub struct TransportLog {
    pub created: usize,
    pub offers: usize,
    pub answers: usize,
    pub closed: usize,
    pub calls: Vec<String>,
}

/// Simulates ICE: once a remote description and a remote candidate are both
/// applied, the transport reports the peer's stream and `Connected`.
pub struct FakeTransportFactory {
    label: String,
    log: Arc<Mutex<TransportLog>>,
    fail_offers: Arc<AtomicBool>,
    last_sink: Mutex<Option<TransportEventSink>>,
}

impl FakeTransportFactory {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log: Arc::new(Mutex::new(TransportLog::default())),
            fail_offers: Arc::new(AtomicBool::new(false)),
            last_sink: Mutex::new(None),
        })
    }

    pub fn fail_offers(&self) {
        self.fail_offers.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.log.lock().unwrap().created
    }

    pub fn offers(&self) -> usize {
        self.log.lock().unwrap().offers
    }

    pub fn answers(&self) -> usize {
        self.log.lock().unwrap().answers
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().calls.clone()
    }

    /// Reports an event from the most recently created transport.
    pub fn emit(&self, event: TransportEvent) {
        let sink = self.last_sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    pub fn remote_stream(id: &str) -> MediaStreamHandle {
        MediaStreamHandle::detached(StreamId::new(id), vec![MediaKind::Audio, MediaKind::Video])
    }
}

#[async_trait]
impl PeerTransportFactory for FakeTransportFactory {
    async fn create(&self, events: TransportEventSink) -> Result<Box<dyn PeerTransport>, TransportError> {
        self.log.lock().unwrap().created += 1;
        *self.last_sink.lock().unwrap() = Some(events.clone());

        Ok(Box::new(FakeTransport {
            label: self.label.clone(),
            log: self.log.clone(),
            fail_offers: self.fail_offers.clone(),
            sink: events,
            ice: Mutex::new(IceProgress::default()),
        }))
    }
}

#[derive(Default)]
struct IceProgress {
    remote_description: bool,
    remote_candidate: bool,
    connected: bool,
}

struct FakeTransport {
    label: String,
    log: Arc<Mutex<TransportLog>>,
    fail_offers: Arc<AtomicBool>,
    sink: TransportEventSink,
    ice: Mutex<IceProgress>,
}

impl FakeTransport {
    fn record(&self, call: String) {
        self.log.lock().unwrap().calls.push(call);
    }

    fn maybe_connect(&self) {
        let mut ice = self.ice.lock().unwrap();
        if ice.connected || !ice.remote_description || !ice.remote_candidate {
            return;
        }
        ice.connected = true;
        drop(ice);

        (self.sink)(TransportEvent::RemoteStream(FakeTransportFactory::remote_stream(&format!(
            "remote-seen-by-{}",
            self.label
        ))));
        (self.sink)(TransportEvent::StateChanged(TransportState::Connected));
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn attach_local_stream(&self, stream: &MediaStreamHandle) -> Result<(), TransportError> {
        self.record(format!("attach:{}", stream.id()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        if self.fail_offers.load(Ordering::SeqCst) {
            return Err(TransportError::Description("no codecs in common".into()));
        }
        self.log.lock().unwrap().offers += 1;
        self.record("create_offer".into());
        Ok(SessionDescription::offer(format!("v=0 offer from {}", self.label)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.log.lock().unwrap().answers += 1;
        self.record("create_answer".into());
        Ok(SessionDescription::answer(format!("v=0 answer from {}", self.label)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        let kind = if description.is_offer() { "offer" } else { "answer" };
        self.record(format!("set_local:{}", kind));
        (self.sink)(TransportEvent::LocalCandidate(IceCandidate::new(format!(
            "candidate:{} 1 udp 2122260223 10.0.0.1 50000 typ host",
            self.label
        ))));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        let kind = if description.is_offer() { "offer" } else { "answer" };
        self.record(format!("set_remote:{}", kind));
        self.ice.lock().unwrap().remote_description = true;
        self.maybe_connect();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.record(format!("add_candidate:{}", candidate.candidate));
        self.ice.lock().unwrap().remote_candidate = true;
        self.maybe_connect();
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.log.lock().unwrap().closed += 1;
        self.record("close".into());
        Ok(())
    }
}

// ==============================================================================
// SIGNALING
// ==============================================================================

/// Signaling client whose inbound events are pushed by the test.
pub struct FakeSignaling {
    events: broadcast::Sender<SignalingEvent>,
    join_error: Mutex<Option<SignalingError>>,
    hang_joins: AtomicBool,
    next_join_delay: Mutex<Option<Duration>>,
    activity: Mutex<Vec<String>>,
    joined: Mutex<Vec<RoomId>>,
    leaves: AtomicUsize,
    sent: Mutex<Vec<SignalingEvent>>,
}

impl FakeSignaling {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            join_error: Mutex::new(None),
            hang_joins: AtomicBool::new(false),
            next_join_delay: Mutex::new(None),
            activity: Mutex::new(Vec::new()),
            joined: Mutex::new(Vec::new()),
            leaves: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_joins(&self, err: SignalingError) {
        *self.join_error.lock().unwrap() = Some(err);
    }

    /// Joins never answer, so only the timeout ends them.
    pub fn hang_joins(&self) {
        self.hang_joins.store(true, Ordering::SeqCst);
    }

    /// The next join answers only after `delay`.
    pub fn delay_next_join(&self, delay: Duration) {
        *self.next_join_delay.lock().unwrap() = Some(delay);
    }

    /// Completed joins and leaves, in the order the room saw them.
    pub fn activity(&self) -> Vec<String> {
        self.activity.lock().unwrap().clone()
    }

    pub fn emit(&self, event: SignalingEvent) {
        let _ = self.events.send(event);
    }

    pub fn joins(&self) -> usize {
        self.joined.lock().unwrap().len()
    }

    pub fn joined_rooms(&self) -> Vec<RoomId> {
        self.joined.lock().unwrap().clone()
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn sent_offers(&self) -> usize {
        self.count_sent(|e| matches!(e, SignalingEvent::OfferReceived { .. }))
    }

    pub fn sent_answers(&self) -> usize {
        self.count_sent(|e| matches!(e, SignalingEvent::AnswerReceived { .. }))
    }

    pub fn sent_candidates(&self) -> usize {
        self.count_sent(|e| matches!(e, SignalingEvent::CandidateReceived { .. }))
    }

    fn count_sent(&self, filter: impl Fn(&SignalingEvent) -> bool) -> usize {
        self.sent.lock().unwrap().iter().filter(|e| filter(e)).count()
    }
}

#[async_trait]
impl SignalingClient for FakeSignaling {
    async fn join_room(&self, room: &RoomId, _participant: &ParticipantInfo) -> Result<(), SignalingError> {
        self.joined.lock().unwrap().push(room.clone());
        if self.hang_joins.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = self.next_join_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let error = self.join_error.lock().unwrap().clone();
        match error {
            Some(err) => Err(err),
            None => {
                self.activity.lock().unwrap().push(format!("join:{}", room));
                Ok(())
            }
        }
    }

    async fn leave_room(&self) -> Result<(), SignalingError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.activity.lock().unwrap().push("leave".into());
        Ok(())
    }

    async fn send_offer(&self, _room: &RoomId, offer: &SessionDescription) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(SignalingEvent::OfferReceived {
            description: offer.clone(),
        });
        Ok(())
    }

    async fn send_answer(&self, _room: &RoomId, answer: &SessionDescription) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(SignalingEvent::AnswerReceived {
            description: answer.clone(),
        });
        Ok(())
    }

    async fn send_candidate(&self, _room: &RoomId, candidate: &IceCandidate) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(SignalingEvent::CandidateReceived {
            candidate: candidate.clone(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent> {
        self.events.subscribe()
    }
}

// ==============================================================================
// HARNESS
// ==============================================================================

pub struct Harness {
    pub controller: CallSessionController,
    pub devices: Arc<FakeDevices>,
    pub transports: Arc<FakeTransportFactory>,
    pub signaling: Arc<FakeSignaling>,
    pub local: ParticipantInfo,
    pub remote: ParticipantInfo,
}

pub fn test_settings() -> CallSettings {
    CallSettings::from_config(&TestConfig::default().to_app_config())
}

pub fn call_request(local_role: ParticipantRole) -> (CallRequest, ParticipantInfo, ParticipantInfo) {
    let (local, remote) = match local_role {
        ParticipantRole::Doctor => (TestParticipant::doctor().to_info(), TestParticipant::patient().to_info()),
        ParticipantRole::Patient => (TestParticipant::patient().to_info(), TestParticipant::doctor().to_info()),
    };
    let request = CallRequest::new(TestAppointment::confirmed("A1"), local.clone(), remote.clone());
    (request, local, remote)
}

pub fn harness(local_role: ParticipantRole) -> Harness {
    init_tracing();

    let devices = FakeDevices::new();
    let transports = FakeTransportFactory::new(local_role.as_str());
    let signaling = FakeSignaling::new();
    let (request, local, remote) = call_request(local_role);

    let services = CallServices {
        signaling: signaling.clone(),
        devices: devices.clone(),
        transports: transports.clone(),
    };
    let controller = CallSessionController::new(request, services, test_settings())
        .expect("confirmed appointment with distinct roles");

    Harness {
        controller,
        devices,
        transports,
        signaling,
        local,
        remote,
    }
}

pub fn unconfirmed_request(status: AppointmentStatus) -> CallRequest {
    CallRequest::new(
        TestAppointment::with_status("A1", status),
        TestParticipant::doctor().to_info(),
        TestParticipant::patient().to_info(),
    )
}
