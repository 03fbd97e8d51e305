//! Signaling Dispatcher
//!
//! The per-client loop. Consumes inbound text frames and engine events in
//! arrival order and routes each to the negotiation or relay logic. When the
//! loop ends, for whatever reason, the client is disconnected.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::client::Client;
use super::engine::TaggedEvent;
use super::server::RelayServer;
use super::signal::Signal;

/// Run a client's dispatcher to completion, then clean the client up.
///
/// The loop runs on its own task so that a panic inside it still ends in
/// [`RelayServer::disconnect`].
pub async fn serve_client<S>(
    server: Arc<RelayServer>,
    client: Arc<Client>,
    frames: S,
    events: mpsc::Receiver<TaggedEvent>,
) where
    S: Stream<Item = String> + Send + Unpin + 'static,
{
    let task = tokio::spawn(run(
        Arc::clone(&server),
        Arc::clone(&client),
        frames,
        events,
    ));

    if let Err(e) = task.await {
        error!(client_id = %client.id, error = %e, "Dispatcher task failed");
    }

    server.disconnect(&client).await;
}

async fn run<S>(
    server: Arc<RelayServer>,
    client: Arc<Client>,
    mut frames: S,
    mut events: mpsc::Receiver<TaggedEvent>,
) where
    S: Stream<Item = String> + Send + Unpin,
{
    let shutdown = client.shutdown_token();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!(client_id = %client.id, "Transport closing, dispatcher stopping");
                break;
            }
            frame = frames.next() => {
                let Some(text) = frame else {
                    debug!(client_id = %client.id, "Signaling stream ended");
                    break;
                };
                handle_frame(&server, &client, &text).await;
            }
            Some(event) = events.recv() => {
                if server.handle_session_event(&client, event).await.is_break() {
                    break;
                }
            }
        }
    }
}

async fn handle_frame(server: &RelayServer, client: &Arc<Client>, text: &str) {
    let signal = match Signal::decode(text) {
        Ok(Some(signal)) => signal,
        Ok(None) => {
            debug!(client_id = %client.id, "Ignoring unknown message type");
            return;
        }
        Err(e) => {
            warn!(client_id = %client.id, error = %e, "Malformed signaling message");
            return;
        }
    };

    let kind = signal.kind();
    let result = match signal {
        Signal::SdpOffer(offer) => server.handle_offer(client, offer).await,
        Signal::IceCandidate(candidate) => server.handle_candidate(client, candidate).await,
        Signal::MuteChanged(update) => {
            client.apply_mute(update).await;
            debug!(
                client_id = %client.id,
                self_muted = update.self_muted,
                mic_muted = update.mic_muted,
                "Mute state updated"
            );
            Ok(())
        }
        Signal::SdpAnswer(_) | Signal::ClientDisconnected(_) => {
            debug!(client_id = %client.id, kind, "Ignoring server-only message");
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(client_id = %client.id, kind, error = %e, "Failed to handle signaling message");
    }
}
