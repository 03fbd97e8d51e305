//! Voice Relay
//!
//! Forwards each payload received on a client's voice channel, unmodified,
//! to the voice channel of every other member of its room.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{trace, warn};

use super::client::{Client, VOICE_CHANNEL_LABEL};
use super::room::Room;
use super::server::RelayServer;

/// Send `payload` to every member of `room` except `sender_id`.
///
/// Members without an open voice channel are skipped. A failed send is
/// logged and does not affect the other recipients. Returns the number of
/// successful deliveries.
pub async fn fan_out(room: &Room, sender_id: &str, payload: &Bytes) -> usize {
    let mut targets = Vec::new();
    for member in room.other_members(sender_id).await {
        if let Some(channel) = member.channel(VOICE_CHANNEL_LABEL).await {
            targets.push((member, channel));
        }
    }

    let results = join_all(
        targets
            .iter()
            .map(|(_, channel)| async move { channel.send(payload).await }),
    )
    .await;

    let mut delivered = 0;
    for ((member, _), result) in targets.iter().zip(results) {
        match result {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(sender_id, recipient_id = %member.id, error = %e, "Failed to relay voice payload");
            }
        }
    }

    delivered
}

impl RelayServer {
    /// Relay a voice payload from `client` to the rest of its room.
    pub(crate) async fn relay_voice(&self, client: &Arc<Client>, payload: &Bytes) {
        if client.is_closed() {
            return;
        }
        let Some(room) = client.room().await else {
            return;
        };

        let delivered = fan_out(&room, &client.id, payload).await;
        trace!(client_id = %client.id, bytes = payload.len(), delivered, "Relayed voice payload");
    }
}
