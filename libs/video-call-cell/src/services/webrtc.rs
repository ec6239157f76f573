// libs/video-call-cell/src/services/webrtc.rs
//! [`PeerTransport`] over webrtc-rs. Enabled with the `webrtc` feature.
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use shared_config::AppConfig;

use crate::error::TransportError;
use crate::models::{
    IceCandidate, MediaKind, MediaStreamHandle, SdpType, SessionDescription, StreamId, TransportEvent,
    TransportState,
};
use crate::services::peer::{PeerTransport, PeerTransportFactory, TransportEventSink};

/// Local sample tracks a capture backend writes into.
///
/// Carry one of these as the platform object of the local [`MediaStreamHandle`]
/// so the transport can attach its tracks.
pub struct WebRtcLocalTracks {
    pub stream_id: StreamId,
    pub audio: Option<Arc<TrackLocalStaticSample>>,
    pub video: Option<Arc<TrackLocalStaticSample>>,
}

impl WebRtcLocalTracks {
    /// Opus audio and VP8 video tracks under one stream id.
    pub fn new(stream_id: StreamId, audio: bool, video: bool) -> Self {
        let track = |mime: &str, kind: &str| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime.to_owned(),
                    ..Default::default()
                },
                format!("{}-{}", stream_id, kind),
                stream_id.to_string(),
            ))
        };

        Self {
            audio: audio.then(|| track(MIME_TYPE_OPUS, "audio")),
            video: video.then(|| track(MIME_TYPE_VP8, "video")),
            stream_id,
        }
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.audio.is_some() {
            kinds.push(MediaKind::Audio);
        }
        if self.video.is_some() {
            kinds.push(MediaKind::Video);
        }
        kinds
    }

    pub fn into_handle(self) -> MediaStreamHandle {
        let id = self.stream_id.clone();
        let kinds = self.kinds();
        MediaStreamHandle::new(id, kinds, Arc::new(self))
    }
}

/// Remote tracks grouped by the stream id the sender put them under.
///
/// The platform object of every remote [`MediaStreamHandle`] this transport
/// reports; later tracks of the same stream land in the same object.
pub struct WebRtcRemoteStream {
    pub stream_id: StreamId,
    tracks: Mutex<Vec<(MediaKind, Arc<TrackRemote>)>>,
}

impl WebRtcRemoteStream {
    fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            tracks: Mutex::new(Vec::new()),
        }
    }

    pub fn tracks(&self) -> Vec<Arc<TrackRemote>> {
        match self.tracks.lock() {
            Ok(tracks) => tracks.iter().map(|(_, track)| track.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn track(&self, kind: MediaKind) -> Option<Arc<TrackRemote>> {
        let tracks = self.tracks.lock().ok()?;
        tracks.iter().find(|(k, _)| *k == kind).map(|(_, track)| track.clone())
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        match self.tracks.lock() {
            Ok(tracks) => kinds_in_order(tracks.iter().map(|(kind, _)| *kind)),
            Err(_) => Vec::new(),
        }
    }

    fn push(&self, kind: MediaKind, track: Arc<TrackRemote>) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.push((kind, track));
        }
    }
}

/// Audio before video, each at most once.
fn kinds_in_order(kinds: impl IntoIterator<Item = MediaKind>) -> Vec<MediaKind> {
    let present: Vec<MediaKind> = kinds.into_iter().collect();
    [MediaKind::Audio, MediaKind::Video]
        .into_iter()
        .filter(|kind| present.contains(kind))
        .collect()
}

type RemoteStreams = Arc<Mutex<HashMap<StreamId, Arc<WebRtcRemoteStream>>>>;

fn remote_stream_for(streams: &RemoteStreams, id: StreamId) -> Option<Arc<WebRtcRemoteStream>> {
    let mut streams = streams.lock().ok()?;
    let stream = streams
        .entry(id.clone())
        .or_insert_with(|| Arc::new(WebRtcRemoteStream::new(id)));
    Some(stream.clone())
}

pub struct WebRtcTransportFactory {
    ice_servers: Vec<String>,
}

impl WebRtcTransportFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ice_server_urls.clone())
    }

    async fn build(&self) -> Result<RTCPeerConnection> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().context("registering codecs")?;

        let registry = register_default_interceptors(Registry::new(), &mut media)
            .context("registering interceptors")?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        api.new_peer_connection(config)
            .await
            .context("creating peer connection")
    }
}

#[async_trait]
impl PeerTransportFactory for WebRtcTransportFactory {
    async fn create(&self, events: TransportEventSink) -> Result<Box<dyn PeerTransport>, TransportError> {
        let pc = self
            .build()
            .await
            .map_err(|e| TransportError::Setup(format!("{:#}", e)))?;

        let transport = WebRtcPeerTransport { pc: Arc::new(pc) };
        transport.register_handlers(events);

        info!("Created webrtc peer connection ({} ICE servers)", self.ice_servers.len());
        Ok(Box::new(transport))
    }
}

pub struct WebRtcPeerTransport {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcPeerTransport {
    fn register_handlers(&self, events: TransportEventSink) {
        let sink = events.clone();
        self.pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = sink.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => sink(TransportEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    })),
                    Err(e) => warn!("Could not serialise local candidate: {}", e),
                }
            })
        }));

        let sink = events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let sink = sink.clone();
                Box::pin(async move {
                    let mapped = match state {
                        RTCPeerConnectionState::New => TransportState::New,
                        RTCPeerConnectionState::Connecting => TransportState::Connecting,
                        RTCPeerConnectionState::Connected => TransportState::Connected,
                        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                        RTCPeerConnectionState::Failed => TransportState::Failed,
                        RTCPeerConnectionState::Closed => TransportState::Closed,
                        _ => return,
                    };
                    sink(TransportEvent::StateChanged(mapped));
                })
            }));

        let sink = events;
        let streams: RemoteStreams = Arc::default();
        self.pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let sink = sink.clone();
            let streams = streams.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    RTPCodecType::Video => MediaKind::Video,
                    _ => return,
                };
                let id = StreamId::new(track.stream_id());
                let Some(stream) = remote_stream_for(&streams, id.clone()) else {
                    warn!("Remote stream registry unavailable, dropping {} track", kind);
                    return;
                };
                stream.push(kind, track);

                // Every report carries all tracks of the stream seen so far.
                let kinds = stream.kinds();
                sink(TransportEvent::RemoteStream(MediaStreamHandle::new(id, kinds, stream)));
            })
        }));
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let result = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    };
    result.map_err(|e| TransportError::Description(e.to_string()))
}

fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription, TransportError> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(description.sdp)),
        other => Err(TransportError::Description(format!("unexpected {} description", other))),
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeerTransport {
    async fn attach_local_stream(&self, stream: &MediaStreamHandle) -> Result<(), TransportError> {
        let tracks = stream
            .downcast_ref::<WebRtcLocalTracks>()
            .ok_or(TransportError::UnsupportedStream)?;

        for track in [&tracks.audio, &tracks.video].into_iter().flatten() {
            let track: Arc<dyn TrackLocal + Send + Sync> = track.clone();
            self.pc
                .add_track(track)
                .await
                .map_err(|e| TransportError::Setup(e.to_string()))?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.pc
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| TransportError::Candidate(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::Setup(e.to_string()))
    }
}
