//! Voice HTTP Handlers
//!
//! Signaling itself runs over the WebSocket (see ws/mod.rs).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::engine::IceServerConfig;
use crate::api::AppState;

/// Response containing ICE server configuration.
#[derive(Debug, Serialize)]
pub struct IceServersResponse {
    /// STUN/TURN servers for the browser's peer connection.
    pub ice_servers: Vec<IceServerConfig>,
}

/// Get ICE server configuration.
///
/// GET /connect/ice-servers
///
/// Lists whatever STUN and TURN servers the relay itself uses, so clients
/// can configure NAT traversal the same way. Empty when none are set.
pub async fn get_ice_servers(State(state): State<AppState>) -> Json<IceServersResponse> {
    Json(IceServersResponse {
        ice_servers: state.relay.engine().ice_servers(),
    })
}
