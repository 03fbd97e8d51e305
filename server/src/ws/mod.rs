//! WebSocket Handler
//!
//! Signaling transport. Admits a connection on its token, then bridges the
//! socket to the client's dispatcher: inbound text frames become a stream,
//! outbound signals are written by a dedicated task.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::auth::{AdmissionError, TokenRegistry};
use crate::voice::{self, RelayServer, Signal};

/// Capacity of a client's outbound signal queue.
const OUTBOUND_QUEUE_CAPACITY: usize = 100;

/// Signaling connection query params.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Admission token from `GET /connect/token`.
    #[serde(default)]
    pub token: Option<String>,
}

/// Check and consume an admission token.
///
/// Returns the client ID for the connection, which is the token itself.
pub fn admit(tokens: &TokenRegistry, token: Option<&str>) -> Result<String, AdmissionError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(AdmissionError::MissingToken)?;

    if tokens.consume(token) {
        Ok(token.to_owned())
    } else {
        Err(AdmissionError::InvalidToken)
    }
}

/// WebSocket upgrade handler.
///
/// GET /connect?token=...
pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    // Validate token before upgrade
    let client_id = match admit(&state.tokens, query.token.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            debug!(error = %e, "Rejected signaling connection");
            return e.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let relay = Arc::clone(&state.relay);
    ws.on_upgrade(move |socket| handle_socket(socket, relay, client_id))
}

/// Handle an admitted WebSocket connection until either side ends it.
async fn handle_socket(socket: WebSocket, relay: Arc<RelayServer>, client_id: String) {
    let (ws_sender, ws_receiver) = socket.split();

    // Channel for sending signals to the WebSocket
    let (tx, rx) = mpsc::channel::<Signal>(OUTBOUND_QUEUE_CAPACITY);

    let (client, events) = relay.connect(client_id, tx).await;
    let shutdown = client.shutdown_token();

    let writer = tokio::spawn(write_loop(ws_sender, rx, shutdown.clone()));

    let client_id = client.id.clone();
    let frames = ws_receiver
        .take_while(move |msg| {
            let keep = match msg {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "WebSocket error");
                    false
                }
            };
            future::ready(keep)
        })
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                // Binary, ping and pong frames carry no signaling
                _ => None,
            })
        })
        .boxed();

    voice::serve_client(Arc::clone(&relay), Arc::clone(&client), frames, events).await;

    // Cleanup cancelled the token, so the writer is finishing up.
    if let Err(e) = writer.await {
        warn!(client_id = %client.id, error = %e, "Signal writer task failed");
    }

    info!(client_id = %client.id, "WebSocket disconnected");
}

/// Forward queued signals to the socket until shutdown or a write fails.
async fn write_loop(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Signal>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            signal = rx.recv() => {
                let Some(signal) = signal else { break };
                if let Err(e) = ws_sender.send(Message::Text(signal.encode().into())).await {
                    debug!(error = %e, "WebSocket write failed");
                    // Ends the dispatcher, which triggers cleanup.
                    shutdown.cancel();
                    break;
                }
            }
        }
    }

    // Deliver whatever was already queued, then close.
    while let Ok(signal) = rx.try_recv() {
        if ws_sender
            .send(Message::Text(signal.encode().into()))
            .await
            .is_err()
        {
            break;
        }
    }
    let _ = ws_sender.send(Message::Close(None)).await;
}
