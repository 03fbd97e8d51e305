//! Voice Rooms
//!
//! A room is a relay domain: voice payloads from one member are fanned out
//! to every other member.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::client::Client;
use super::signal::Signal;

/// Per-room policy knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSettings {
    /// Client whose audio is prioritized. Not yet consulted by relaying.
    pub priority_speaker: Option<String>,
}

/// A named group of clients.
pub struct Room {
    /// Room ID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Connected members by client ID.
    members: RwLock<HashMap<String, Arc<Client>>>,
    settings: RwLock<RoomSettings>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            members: RwLock::new(HashMap::new()),
            settings: RwLock::new(RoomSettings::default()),
        }
    }

    /// Add a member. Returns `false` if a client with that ID is already in.
    pub async fn add_member(&self, client: Arc<Client>) -> bool {
        let mut members = self.members.write().await;
        if members.contains_key(&client.id) {
            return false;
        }
        members.insert(client.id.clone(), client);
        true
    }

    /// Remove a member.
    pub async fn remove_member(&self, client_id: &str) -> Option<Arc<Client>> {
        self.members.write().await.remove(client_id)
    }

    pub async fn contains(&self, client_id: &str) -> bool {
        self.members.read().await.contains_key(client_id)
    }

    pub async fn get_member(&self, client_id: &str) -> Option<Arc<Client>> {
        self.members.read().await.get(client_id).cloned()
    }

    /// Snapshot of every member except one.
    pub async fn other_members(&self, exclude_client_id: &str) -> Vec<Arc<Client>> {
        self.members
            .read()
            .await
            .iter()
            .filter(|(id, _)| id.as_str() != exclude_client_id)
            .map(|(_, client)| Arc::clone(client))
            .collect()
    }

    /// IDs of all members.
    pub async fn member_ids(&self) -> Vec<String> {
        self.members.read().await.keys().cloned().collect()
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    /// Send a signaling message to every member except one.
    ///
    /// The member list is cloned first so the lock is not held during I/O.
    /// Members whose outbound queue is full miss the message.
    pub async fn broadcast_except(&self, exclude_client_id: &str, signal: &Signal) {
        for client in self.other_members(exclude_client_id).await {
            if let Err(e) = client.try_send(signal.clone()) {
                warn!(client_id = %client.id, room_id = %self.id, error = %e, "Failed to notify room member");
            }
        }
    }

    pub async fn settings(&self) -> RoomSettings {
        self.settings.read().await.clone()
    }

    pub async fn set_priority_speaker(&self, client_id: Option<String>) {
        self.settings.write().await.priority_speaker = client_id;
    }

    /// Drop the priority speaker if it is `client_id`.
    pub async fn clear_priority_speaker_if(&self, client_id: &str) -> bool {
        let mut settings = self.settings.write().await;
        if settings.priority_speaker.as_deref() == Some(client_id) {
            settings.priority_speaker = None;
            return true;
        }
        false
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
