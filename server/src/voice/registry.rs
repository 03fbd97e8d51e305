//! Room and Client Registry
//!
//! Owns every room and the global client index. All membership changes go
//! through here so a client's room reference and the room's member set
//! always agree once an admit/remove call has returned.
//!
//! Lock order is rooms -> room members -> client index.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::client::Client;
use super::room::Room;

/// Registry of rooms and connected clients.
pub struct Registry {
    rooms: RwLock<HashMap<Uuid, Arc<Room>>>,
    clients: RwLock<HashMap<String, Arc<Client>>>,
    default_room: Arc<Room>,
}

impl Registry {
    /// Create a registry holding a single default room.
    pub fn new(default_room_name: impl Into<String>) -> Self {
        let default_room = Arc::new(Room::new(default_room_name));
        info!(room_id = %default_room.id, name = %default_room.name, "Created default room");

        let mut rooms = HashMap::new();
        rooms.insert(default_room.id, Arc::clone(&default_room));

        Self {
            rooms: RwLock::new(rooms),
            clients: RwLock::new(HashMap::new()),
            default_room,
        }
    }

    /// The room that exists for the lifetime of the process.
    pub fn default_room(&self) -> Arc<Room> {
        Arc::clone(&self.default_room)
    }

    /// Add another room.
    pub async fn create_room(&self, name: impl Into<String>) -> Arc<Room> {
        let room = Arc::new(Room::new(name));
        self.rooms.write().await.insert(room.id, Arc::clone(&room));
        debug!(room_id = %room.id, name = %room.name, "Created room");
        room
    }

    pub async fn get_room(&self, room_id: Uuid) -> Option<Arc<Room>> {
        self.rooms.read().await.get(&room_id).cloned()
    }

    pub async fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.read().await.values().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Register a client and place it in a room.
    ///
    /// Joins the first room found in the registry. Map iteration order is
    /// arbitrary, so with several rooms this is not load balancing.
    pub async fn admit(&self, client: &Arc<Client>) -> Option<Arc<Room>> {
        let room = {
            let rooms = self.rooms.read().await;
            let room = rooms.values().next().cloned();
            if let Some(room) = &room {
                room.add_member(Arc::clone(client)).await;
                client.set_room(Some(Arc::clone(room))).await;
            }
            room
        };

        self.clients
            .write()
            .await
            .insert(client.id.clone(), Arc::clone(client));

        if let Some(room) = &room {
            debug!(client_id = %client.id, room_id = %room.id, "Client joined room");
        }

        room
    }

    /// Remove a client from its room and from the index.
    ///
    /// Returns the room it left, if any. Safe to call repeatedly.
    pub async fn remove(&self, client: &Client) -> Option<Arc<Room>> {
        let room = client.take_room().await;

        if let Some(room) = &room {
            room.remove_member(&client.id).await;
            room.clear_priority_speaker_if(&client.id).await;
            debug!(client_id = %client.id, room_id = %room.id, "Client left room");
        }

        self.clients.write().await.remove(&client.id);

        room
    }

    pub async fn get_client(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients.read().await.get(client_id).cloned()
    }

    /// Snapshot of every connected client.
    pub async fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().await.values().cloned().collect()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
