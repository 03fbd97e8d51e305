//! Voice Relay Server
//!
//! Signaling and payload relay for peer-to-peer voice rooms. Clients fetch a
//! single-use token over HTTP, open a WebSocket with it, negotiate a peer
//! session with the server, and from then on have their voice payloads
//! forwarded to everyone else in their room.

pub mod api;
pub mod auth;
pub mod config;
pub mod voice;
pub mod ws;
