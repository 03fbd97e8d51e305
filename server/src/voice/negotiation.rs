//! Negotiation
//!
//! Drives a client's peer session through offer -> answer, feeds it remote
//! candidates, and reacts to what the engine reports back.
//!
//! All of this runs on the client's dispatcher task. Engine callbacks only
//! enqueue [`SessionEvent`]s, so per-client state is never mutated from two
//! places at once. Events carry the id of the session that raised them;
//! events from a session the client no longer holds are dropped.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::client::{Client, NegotiationState, GENERAL_CHANNEL_LABEL, VOICE_CHANNEL_LABEL};
use super::engine::{PayloadChannel, PeerSession, SessionEvent, SessionId, TaggedEvent};
use super::error::VoiceError;
use super::server::RelayServer;
use super::signal::{CandidateInit, SessionDescription, Signal};

impl RelayServer {
    /// Answer a client's offer.
    ///
    /// On any failure the attempt is abandoned: the session (if any) is
    /// closed and the client drops back to `Idle`, ready for a fresh offer.
    pub async fn handle_offer(
        &self,
        client: &Arc<Client>,
        offer: SessionDescription,
    ) -> Result<(), VoiceError> {
        if client.is_closed() {
            return Err(VoiceError::Disconnected(client.id.clone()));
        }

        let previous = client.state().await;
        client.set_state(NegotiationState::Negotiating).await;

        let result = match self.negotiation_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.negotiate(client, offer, previous))
                .await
                .unwrap_or(Err(VoiceError::NegotiationTimeout)),
            None => self.negotiate(client, offer, previous).await,
        };

        if result.is_err() {
            abandon(client).await;
        }

        result
    }

    async fn negotiate(
        &self,
        client: &Arc<Client>,
        offer: SessionDescription,
        previous: NegotiationState,
    ) -> Result<(), VoiceError> {
        let (session, created) = match client.session().await {
            Some(session) => (session, false),
            None => {
                let sink = client.new_session_sink();
                let session_id = sink.session_id();
                let session = self.engine().create_session(sink).await?;
                client.set_session(session_id, Arc::clone(&session)).await;
                debug!(client_id = %client.id, "Peer session created");
                (session, true)
            }
        };

        // Cleanup may have run while the engine was busy.
        if client.is_closed() {
            return Err(VoiceError::Disconnected(client.id.clone()));
        }

        session.set_remote_description(offer).await?;
        let answer = session.create_answer().await?;
        session.set_local_description(answer.clone()).await?;

        client.send(Signal::SdpAnswer(answer)).await?;
        debug!(client_id = %client.id, "SDP answer sent");

        let next = if previous == NegotiationState::ChannelsOpen {
            NegotiationState::ChannelsOpen
        } else {
            NegotiationState::Answered
        };
        client.set_state(next).await;

        if created {
            open_payload_channels(client, session.as_ref()).await;
        }

        Ok(())
    }

    /// Hand a client-discovered candidate to its session.
    pub async fn handle_candidate(
        &self,
        client: &Client,
        candidate: CandidateInit,
    ) -> Result<(), VoiceError> {
        let Some(session) = client.session().await else {
            return Err(VoiceError::NotNegotiated(client.id.clone()));
        };

        session.add_remote_candidate(candidate).await?;
        trace!(client_id = %client.id, "Remote ICE candidate added");
        Ok(())
    }

    /// React to one engine event. `Break` ends the client's dispatcher loop.
    pub async fn handle_session_event(
        &self,
        client: &Arc<Client>,
        tagged: TaggedEvent,
    ) -> ControlFlow<()> {
        let TaggedEvent { session_id, event } = tagged;

        if client.session_id().await != Some(session_id) {
            debug!(client_id = %client.id, session_id, event = ?event, "Dropping event from stale session");
            if let SessionEvent::ChannelOpened(channel) = event {
                let _ = channel.close().await;
            }
            return ControlFlow::Continue(());
        }

        match event {
            SessionEvent::StateChanged(state) => {
                debug!(client_id = %client.id, state = ?state, "Peer session state changed");
                if state.is_terminal() {
                    info!(client_id = %client.id, state = ?state, "Peer session ended");
                    self.disconnect(client).await;
                    return ControlFlow::Break(());
                }
            }
            SessionEvent::LocalCandidate(None) => {
                debug!(client_id = %client.id, "ICE candidate gathering complete");
            }
            SessionEvent::LocalCandidate(Some(candidate)) => {
                if let Err(e) = client.send(Signal::IceCandidate(candidate)).await {
                    warn!(client_id = %client.id, error = %e, "Failed to send ICE candidate");
                }
            }
            SessionEvent::ChannelOpened(channel) => {
                record_channel(client, session_id, channel).await;
            }
            SessionEvent::VoicePayload(payload) => self.relay_voice(client, &payload).await,
        }

        ControlFlow::Continue(())
    }
}

async fn open_payload_channels(client: &Client, session: &dyn PeerSession) {
    for label in [GENERAL_CHANNEL_LABEL, VOICE_CHANNEL_LABEL] {
        if let Err(e) = session.create_payload_channel(label).await {
            warn!(client_id = %client.id, label, error = %e, "Failed to create payload channel");
        }
    }
}

async fn record_channel(
    client: &Arc<Client>,
    session_id: SessionId,
    channel: Arc<dyn PayloadChannel>,
) {
    let label = channel.label().to_owned();

    if client.is_closed() {
        let _ = channel.close().await;
        return;
    }

    debug!(client_id = %client.id, label = %label, "Payload channel opened");

    if label == VOICE_CHANNEL_LABEL {
        let events = client.event_sink(session_id);
        let client_id = client.id.clone();
        channel.on_payload(Arc::new(move |payload| {
            // Stale audio is worthless; drop rather than wait.
            if !events.try_send(SessionEvent::VoicePayload(payload)) {
                trace!(client_id = %client_id, "Voice payload dropped");
            }
        }));
    }

    if let Some(previous) = client.insert_channel(channel).await {
        let _ = previous.close().await;
    }

    if label == VOICE_CHANNEL_LABEL {
        client.set_state(NegotiationState::ChannelsOpen).await;
    }
}

async fn abandon(client: &Client) {
    for channel in client.drain_channels().await {
        let _ = channel.close().await;
    }
    if let Some(session) = client.take_session().await {
        if let Err(e) = session.close().await {
            debug!(client_id = %client.id, error = %e, "Error closing abandoned session");
        }
    }
    client.set_state(NegotiationState::Idle).await;
}
