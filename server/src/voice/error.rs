//! Voice Service Errors

use thiserror::Error;

use super::signal::SignalError;

/// Errors that can occur while serving a client.
///
/// None of these terminate the process; the dispatcher logs them and, except
/// for [`VoiceError::Transport`], keeps the connection open.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Peer-session engine failure.
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// Undecodable or unexpected signaling message.
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalError),

    /// Candidate arrived before any offer.
    #[error("Client {0} has no peer session")]
    NotNegotiated(String),

    /// Negotiation step did not finish in time.
    #[error("Negotiation timed out")]
    NegotiationTimeout,

    /// Payload channel send/close failure.
    #[error("Payload channel {label} failed: {reason}")]
    Channel { label: String, reason: String },

    /// Client's outbound queue is full.
    #[error("Outbound queue full for client {0}")]
    Backpressure(String),

    /// Signaling connection is gone.
    #[error("Transport closed for client {0}")]
    Transport(String),

    /// Client was already cleaned up.
    #[error("Client {0} is disconnected")]
    Disconnected(String),
}

impl From<webrtc::Error> for VoiceError {
    fn from(err: webrtc::Error) -> Self {
        Self::WebRtc(err.to_string())
    }
}
