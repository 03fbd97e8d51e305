//! Connected Client
//!
//! One admitted participant: its signaling outlet, its peer session, the
//! payload channels the session has opened, and its room membership.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::engine::{EventSink, PayloadChannel, PeerSession, SessionId, TaggedEvent};
use super::error::VoiceError;
use super::room::Room;
use super::signal::{MuteUpdate, Signal};

/// Label of the channel whose payloads are relayed to the room.
pub const VOICE_CHANNEL_LABEL: &str = "voip";

/// Label of the general-purpose channel.
pub const GENERAL_CHANNEL_LABEL: &str = "myDataChannel";

/// Capacity of the per-client engine event queue.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Where a client is in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No peer session.
    Idle,
    /// Offer received, answer not yet sent.
    Negotiating,
    /// Answer sent; candidates may still arrive.
    Answered,
    /// Voice channel is open.
    ChannelsOpen,
    /// Cleaned up. Terminal.
    Disconnected,
}

/// Mute flags. Stored and reported only; relaying ignores them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteFlags {
    pub self_muted: bool,
    pub mic_muted: bool,
    pub admin_muted: bool,
}

/// An admitted participant.
pub struct Client {
    /// Client ID (the admission token it connected with).
    pub id: String,
    /// Outgoing signaling messages, drained by the transport writer.
    signal_tx: mpsc::Sender<Signal>,
    /// Engine callbacks for this client land here.
    events_tx: mpsc::Sender<TaggedEvent>,
    /// Id handed to the next session created for this client.
    next_session_id: AtomicU64,
    /// Cancelled when the transport must close.
    shutdown: CancellationToken,
    /// One-shot cleanup guard.
    closed: AtomicBool,
    /// Current session and its id.
    session: RwLock<Option<(SessionId, Arc<dyn PeerSession>)>>,
    /// Established payload channels by label.
    channels: RwLock<HashMap<String, Arc<dyn PayloadChannel>>>,
    room: RwLock<Option<Arc<Room>>>,
    state: RwLock<NegotiationState>,
    mute: RwLock<MuteFlags>,
}

impl Client {
    /// Create a client and the receiving end of its event queue.
    pub fn new(
        id: impl Into<String>,
        signal_tx: mpsc::Sender<Signal>,
    ) -> (Self, mpsc::Receiver<TaggedEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let client = Self {
            id: id.into(),
            signal_tx,
            events_tx,
            next_session_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            session: RwLock::new(None),
            channels: RwLock::new(HashMap::new()),
            room: RwLock::new(None),
            state: RwLock::new(NegotiationState::Idle),
            mute: RwLock::new(MuteFlags::default()),
        };

        (client, events_rx)
    }

    /// Queue a signaling message for this client.
    pub async fn send(&self, signal: Signal) -> Result<(), VoiceError> {
        self.signal_tx
            .send(signal)
            .await
            .map_err(|_| VoiceError::Transport(self.id.clone()))
    }

    /// Queue a signaling message without waiting for the writer.
    ///
    /// Used where a stalled peer must not hold up the caller.
    pub fn try_send(&self, signal: Signal) -> Result<(), VoiceError> {
        self.signal_tx.try_send(signal).map_err(|e| match e {
            TrySendError::Full(_) => VoiceError::Backpressure(self.id.clone()),
            TrySendError::Closed(_) => VoiceError::Transport(self.id.clone()),
        })
    }

    /// Event sink for a session about to be created. Each call allocates a
    /// fresh session id.
    pub fn new_session_sink(&self) -> EventSink {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.event_sink(session_id)
    }

    /// Event sink tagged with an existing session's id.
    pub fn event_sink(&self, session_id: SessionId) -> EventSink {
        EventSink::new(session_id, self.events_tx.clone())
    }

    /// Token cancelled when the transport is closed.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the transport to close.
    pub fn close_transport(&self) {
        self.shutdown.cancel();
    }

    /// Flip the closed flag. Only the first caller gets `true`.
    pub fn mark_closed(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn session(&self) -> Option<Arc<dyn PeerSession>> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|(_, session)| Arc::clone(session))
    }

    /// Id of the current session, if any.
    pub async fn session_id(&self) -> Option<SessionId> {
        self.session.read().await.as_ref().map(|(id, _)| *id)
    }

    pub async fn set_session(&self, session_id: SessionId, session: Arc<dyn PeerSession>) {
        *self.session.write().await = Some((session_id, session));
    }

    pub async fn take_session(&self) -> Option<Arc<dyn PeerSession>> {
        self.session.write().await.take().map(|(_, session)| session)
    }

    /// Look up an established channel by label.
    pub async fn channel(&self, label: &str) -> Option<Arc<dyn PayloadChannel>> {
        self.channels.read().await.get(label).cloned()
    }

    /// Record an opened channel, returning any channel it replaced.
    pub async fn insert_channel(
        &self,
        channel: Arc<dyn PayloadChannel>,
    ) -> Option<Arc<dyn PayloadChannel>> {
        let label = channel.label().to_owned();
        self.channels.write().await.insert(label, channel)
    }

    /// Remove and return every recorded channel.
    pub async fn drain_channels(&self) -> Vec<Arc<dyn PayloadChannel>> {
        self.channels
            .write()
            .await
            .drain()
            .map(|(_, channel)| channel)
            .collect()
    }

    /// Labels of the currently recorded channels.
    pub async fn channel_labels(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    pub async fn room(&self) -> Option<Arc<Room>> {
        self.room.read().await.clone()
    }

    pub(crate) async fn set_room(&self, room: Option<Arc<Room>>) {
        *self.room.write().await = room;
    }

    pub(crate) async fn take_room(&self) -> Option<Arc<Room>> {
        self.room.write().await.take()
    }

    pub async fn state(&self) -> NegotiationState {
        *self.state.read().await
    }

    pub(crate) async fn set_state(&self, state: NegotiationState) {
        let mut current = self.state.write().await;
        // Disconnected is terminal
        if *current != NegotiationState::Disconnected {
            *current = state;
        }
    }

    pub async fn mute(&self) -> MuteFlags {
        *self.mute.read().await
    }

    /// Apply a client-reported mute change. Admin mute is untouched.
    pub async fn apply_mute(&self, update: MuteUpdate) {
        let mut mute = self.mute.write().await;
        mute.self_muted = update.self_muted;
        mute.mic_muted = update.mic_muted;
    }

    pub async fn set_admin_muted(&self, muted: bool) {
        self.mute.write().await.admin_muted = muted;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
