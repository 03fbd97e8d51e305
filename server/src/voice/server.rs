//! Relay Server
//!
//! Owns the registry and the peer-session engine, admits clients, and tears
//! them down again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::client::{Client, NegotiationState};
use super::engine::{SessionEngine, TaggedEvent};
use super::registry::Registry;
use super::signal::Signal;
use crate::config::Config;

/// Signaling and relay orchestration for all clients.
pub struct RelayServer {
    registry: Registry,
    engine: Arc<dyn SessionEngine>,
    negotiation_timeout: Option<Duration>,
}

impl RelayServer {
    /// Create a relay with a fresh registry.
    pub fn new(config: &Config, engine: Arc<dyn SessionEngine>) -> Self {
        Self {
            registry: Registry::new(config.default_room_name.clone()),
            engine,
            negotiation_timeout: config.negotiation_timeout,
        }
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn SessionEngine> {
        &self.engine
    }

    pub(crate) const fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout
    }

    /// Create a client for an admitted connection and place it in a room.
    ///
    /// Returns the client and the receiving end of its event queue, which
    /// the dispatcher consumes.
    pub async fn connect(
        &self,
        client_id: String,
        signal_tx: mpsc::Sender<Signal>,
    ) -> (Arc<Client>, mpsc::Receiver<TaggedEvent>) {
        let (client, events) = Client::new(client_id, signal_tx);
        let client = Arc::new(client);

        match self.registry.admit(&client).await {
            Some(room) => info!(client_id = %client.id, room_id = %room.id, "Client connected"),
            None => warn!(client_id = %client.id, "Client connected but no room is available"),
        }

        (client, events)
    }

    /// Disconnect and release everything a client holds.
    ///
    /// Only the first call per client does anything; later or concurrent
    /// calls return `false` without side effects.
    pub async fn disconnect(&self, client: &Arc<Client>) -> bool {
        if !client.mark_closed() {
            return false;
        }

        info!(client_id = %client.id, "Client disconnected");
        client.set_state(NegotiationState::Disconnected).await;

        // Leave first so nobody relays to this client while it is torn down.
        if let Some(room) = self.registry.remove(client).await {
            room.broadcast_except(&client.id, &Signal::ClientDisconnected(client.id.clone()))
                .await;
        }

        for channel in client.drain_channels().await {
            if let Err(e) = channel.close().await {
                debug!(client_id = %client.id, label = %channel.label(), error = %e, "Error closing payload channel");
            }
        }

        if let Some(session) = client.take_session().await {
            if let Err(e) = session.close().await {
                warn!(client_id = %client.id, error = %e, "Error closing peer session");
            }
        }

        client.close_transport();
        true
    }

    /// Disconnect every client. Used on shutdown.
    pub async fn disconnect_all(&self) -> usize {
        let mut count = 0;
        for client in self.registry.clients().await {
            if self.disconnect(&client).await {
                count += 1;
            }
        }
        count
    }
}
