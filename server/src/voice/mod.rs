//! Voice Relay
//!
//! Signaling and payload relay for peer-to-peer voice rooms.
//!
//! Signaling arrives over WebSocket (see ws/mod.rs). This module provides:
//! - Room and client registry
//! - Offer/answer negotiation against a pluggable peer-session engine
//! - Fan-out of voice payloads to the rest of a room
//! - Disconnect cleanup
//! - HTTP endpoint for ICE server configuration

mod client;
pub mod dispatch;
pub mod engine;
pub mod error;
mod handlers;
mod negotiation;
pub mod registry;
pub mod relay;
pub mod room;
mod server;
pub mod signal;
pub mod webrtc_engine;

use axum::routing::get;
use axum::Router;
// Re-exports
pub use client::{
    Client, MuteFlags, NegotiationState, GENERAL_CHANNEL_LABEL, VOICE_CHANNEL_LABEL,
};
pub use dispatch::serve_client;
pub use engine::{
    EventSink, IceServerConfig, PayloadChannel, PayloadHandler, PeerSession, SessionEngine,
    SessionEvent, SessionId, SessionState, TaggedEvent,
};
pub use error::VoiceError;
pub use handlers::IceServersResponse;
pub use registry::Registry;
pub use room::{Room, RoomSettings};
pub use server::RelayServer;
pub use signal::{CandidateInit, MuteUpdate, SdpType, SessionDescription, Signal, SignalError};
pub use webrtc_engine::WebRtcEngine;

use crate::api::AppState;

/// Create voice router.
///
/// - GET /ice-servers - STUN/TURN configuration for clients
pub fn router() -> Router<AppState> {
    Router::new().route("/ice-servers", get(handlers::get_ice_servers))
}
