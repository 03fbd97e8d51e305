//! WebRTC Engine
//!
//! [`SessionEngine`] backed by `RTCPeerConnection`. Every callback the
//! peer connection exposes is turned into a [`SessionEvent`] on the owning
//! client's queue; nothing here touches relay state directly.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};

use super::engine::{
    EventSink, IceServerConfig, PayloadChannel, PayloadHandler, PeerSession, SessionEngine,
    SessionEvent, SessionState,
};
use super::error::VoiceError;
use super::signal::{CandidateInit, SdpType, SessionDescription};
use crate::config::Config;

/// Engine producing real WebRTC peer connections.
pub struct WebRtcEngine {
    api: API,
    ice_servers: Vec<IceServerConfig>,
}

impl WebRtcEngine {
    /// Build the WebRTC API with Opus and the default interceptors.
    pub fn new(config: &Config) -> Result<Self, VoiceError> {
        let mut media_engine = MediaEngine::default();

        // Register Opus codec for audio
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        info!("WebRTC engine initialized");

        Ok(Self {
            api,
            ice_servers: IceServerConfig::from_config(config),
        })
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SessionEngine for WebRtcEngine {
    async fn create_session(&self, events: EventSink) -> Result<Arc<dyn PeerSession>, VoiceError> {
        let peer_connection = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);

        let tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let tx = tx.clone();
                Box::pin(async move {
                    debug!(state = ?state, "Peer connection state changed");
                    if let Some(state) = map_state(state) {
                        let _ = tx.send(SessionEvent::StateChanged(state)).await;
                    }
                })
            },
        ));

        let tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                let candidate = match candidate {
                    Some(c) => match c.to_json() {
                        Ok(json) => Some(CandidateInit {
                            candidate: json.candidate,
                            sdp_mid: json.sdp_mid,
                            sdp_mline_index: json.sdp_mline_index,
                            username_fragment: json.username_fragment,
                        }),
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize ICE candidate");
                            return;
                        }
                    },
                    None => None,
                };
                let _ = tx.send(SessionEvent::LocalCandidate(candidate)).await;
            })
        }));

        let tx = events;
        peer_connection.on_data_channel(Box::new(move |data_channel: Arc<RTCDataChannel>| {
            let tx = tx.clone();
            Box::pin(async move {
                debug!(label = %data_channel.label(), "Remote data channel announced");
                let channel: Arc<dyn PayloadChannel> =
                    Arc::new(WebRtcChannel::new(Arc::clone(&data_channel)));
                data_channel.on_open(Box::new(move || {
                    Box::pin(async move {
                        let _ = tx.send(SessionEvent::ChannelOpened(channel)).await;
                    })
                }));
            })
        }));

        Ok(Arc::new(WebRtcSession {
            peer_connection,
            local_channels: Mutex::new(Vec::new()),
        }))
    }

    fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.ice_servers.clone()
    }
}

const fn map_state(state: RTCPeerConnectionState) -> Option<SessionState> {
    match state {
        RTCPeerConnectionState::New => Some(SessionState::New),
        RTCPeerConnectionState::Connecting => Some(SessionState::Connecting),
        RTCPeerConnectionState::Connected => Some(SessionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(SessionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(SessionState::Failed),
        RTCPeerConnectionState::Closed => Some(SessionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

/// Wraps one `RTCPeerConnection`.
struct WebRtcSession {
    peer_connection: Arc<RTCPeerConnection>,
    /// Channels we opened ourselves; closed together with the session.
    local_channels: Mutex<Vec<Arc<RTCDataChannel>>>,
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, VoiceError> {
    let description = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(description)
}

#[async_trait]
impl PeerSession for WebRtcSession {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<(), VoiceError> {
        let description = to_rtc_description(offer)?;
        self.peer_connection
            .set_remote_description(description)
            .await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, VoiceError> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, answer: SessionDescription) -> Result<(), VoiceError> {
        let description = to_rtc_description(answer)?;
        self.peer_connection
            .set_local_description(description)
            .await?;
        Ok(())
    }

    async fn create_payload_channel(&self, label: &str) -> Result<(), VoiceError> {
        let channel = self.peer_connection.create_data_channel(label, None).await?;
        self.local_channels.lock().await.push(channel);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<(), VoiceError> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), VoiceError> {
        let channels = std::mem::take(&mut *self.local_channels.lock().await);
        for channel in channels {
            if let Err(e) = channel.close().await {
                debug!(label = %channel.label(), error = %e, "Error closing local data channel");
            }
        }

        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Wraps one `RTCDataChannel`.
struct WebRtcChannel {
    label: String,
    data_channel: Arc<RTCDataChannel>,
}

impl WebRtcChannel {
    fn new(data_channel: Arc<RTCDataChannel>) -> Self {
        Self {
            label: data_channel.label().to_owned(),
            data_channel,
        }
    }

    fn channel_error(&self, err: &webrtc::Error) -> VoiceError {
        VoiceError::Channel {
            label: self.label.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl PayloadChannel for WebRtcChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, payload: &Bytes) -> Result<(), VoiceError> {
        self.data_channel
            .send(payload)
            .await
            .map(|_| ())
            .map_err(|e| self.channel_error(&e))
    }

    fn on_payload(&self, handler: PayloadHandler) {
        self.data_channel
            .on_message(Box::new(move |msg: DataChannelMessage| {
                handler(msg.data);
                Box::pin(async {})
            }));
    }

    async fn close(&self) -> Result<(), VoiceError> {
        self.data_channel
            .close()
            .await
            .map_err(|e| self.channel_error(&e))
    }
}
