//! Peer-Session Engine Interface
//!
//! The relay never talks to a WebRTC stack directly. It drives a
//! [`SessionEngine`] that hands out [`PeerSession`] handles, and it learns
//! about everything the engine does asynchronously through
//! [`SessionEvent`]s pushed onto the owning client's event queue.
//!
//! Every event is tagged with the [`SessionId`] of the session that raised
//! it. A client may abandon a session and start another; events still in
//! flight from the old one are recognised by their tag and dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::error::VoiceError;
use super::signal::{CandidateInit, SessionDescription};

/// Callback invoked for every payload received on a channel.
pub type PayloadHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Identifies one peer session of one client. Never reused by that client.
pub type SessionId = u64;

/// Connection state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl SessionState {
    /// States after which the session will never carry media again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// Something the engine did on its own schedule.
pub enum SessionEvent {
    /// Connection state changed.
    StateChanged(SessionState),
    /// A local candidate was discovered. `None` marks the end of gathering.
    LocalCandidate(Option<CandidateInit>),
    /// The remote side opened a payload channel.
    ChannelOpened(Arc<dyn PayloadChannel>),
    /// Payload received on the voice channel.
    VoicePayload(Bytes),
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged(state) => f.debug_tuple("StateChanged").field(state).finish(),
            Self::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            Self::ChannelOpened(channel) => {
                f.debug_tuple("ChannelOpened").field(&channel.label()).finish()
            }
            Self::VoicePayload(payload) => {
                f.debug_tuple("VoicePayload").field(&payload.len()).finish()
            }
        }
    }
}

/// A [`SessionEvent`] together with the session that raised it.
#[derive(Debug)]
pub struct TaggedEvent {
    pub session_id: SessionId,
    pub event: SessionEvent,
}

/// Sender half of a client's event queue, bound to one session.
///
/// Handed to the engine when a session is created; everything sent through
/// it carries that session's id.
#[derive(Debug, Clone)]
pub struct EventSink {
    session_id: SessionId,
    tx: mpsc::Sender<TaggedEvent>,
}

impl EventSink {
    pub fn new(session_id: SessionId, tx: mpsc::Sender<TaggedEvent>) -> Self {
        Self { session_id, tx }
    }

    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue an event, waiting for room. Returns `false` once the client
    /// is gone.
    pub async fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(self.tag(event)).await.is_ok()
    }

    /// Queue an event without waiting. Returns `false` if the queue is full
    /// or the client is gone.
    pub fn try_send(&self, event: SessionEvent) -> bool {
        self.tx.try_send(self.tag(event)).is_ok()
    }

    fn tag(&self, event: SessionEvent) -> TaggedEvent {
        TaggedEvent {
            session_id: self.session_id,
            event,
        }
    }
}

/// Factory for peer sessions.
#[async_trait]
pub trait SessionEngine: Send + Sync {
    /// Create a session whose callbacks report into `events`.
    async fn create_session(&self, events: EventSink) -> Result<Arc<dyn PeerSession>, VoiceError>;

    /// ICE server URLs handed to browser clients.
    fn ice_servers(&self) -> Vec<IceServerConfig> {
        Vec::new()
    }
}

/// One negotiated point-to-point session.
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Apply the client's offer.
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<(), VoiceError>;

    /// Produce an answer for the applied offer.
    async fn create_answer(&self) -> Result<SessionDescription, VoiceError>;

    /// Apply our answer.
    async fn set_local_description(&self, answer: SessionDescription) -> Result<(), VoiceError>;

    /// Ask the engine to open a channel with `label` towards the client.
    async fn create_payload_channel(&self, label: &str) -> Result<(), VoiceError>;

    /// Feed a candidate discovered by the client.
    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<(), VoiceError>;

    /// Tear the session down. Must tolerate repeated calls.
    async fn close(&self) -> Result<(), VoiceError>;
}

/// Established payload channel.
#[async_trait]
pub trait PayloadChannel: Send + Sync {
    fn label(&self) -> &str;

    /// Send one payload unmodified.
    async fn send(&self, payload: &Bytes) -> Result<(), VoiceError>;

    /// Register the observer for incoming payloads, replacing any previous one.
    fn on_payload(&self, handler: PayloadHandler);

    async fn close(&self) -> Result<(), VoiceError>;
}

/// STUN/TURN server entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IceServerConfig {
    /// Server URLs (e.g., "stun:stun.l.google.com:19302")
    pub urls: Vec<String>,
    /// Username for TURN servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Credential for TURN servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Build the server list from configuration.
    pub fn from_config(config: &crate::config::Config) -> Vec<Self> {
        let mut servers = Vec::new();

        if let Some(stun) = &config.stun_server {
            servers.push(Self {
                urls: vec![stun.clone()],
                username: None,
                credential: None,
            });
        }

        if let Some(turn) = &config.turn_server {
            servers.push(Self {
                urls: vec![turn.clone()],
                username: config.turn_username.clone(),
                credential: config.turn_credential.clone(),
            });
        }

        servers
    }
}
