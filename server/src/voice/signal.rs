//! Signaling Envelope
//!
//! Wire format: `{"type": <kind>, "data": <string>}` in both directions.
//! The outer object is decoded first; `data` is only parsed for kinds this
//! server understands, so unknown kinds can be skipped without error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `type` discriminators.
pub mod kind {
    pub const SDP_OFFER: &str = "sdpOffer";
    pub const SDP_ANSWER: &str = "sdpAnswer";
    pub const ICE_CANDIDATE: &str = "iceCandidate";
    pub const CLIENT_DISCONNECTED: &str = "clientDisconnected";
    pub const MUTE_CHANGED: &str = "muteChanged";
}

/// Envelope decode failures. Never fatal for the connection.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Frame is not a `{type, data}` object.
    #[error("Malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// `data` does not match the structure its `type` requires.
    #[error("Malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Session description with no SDP text.
    #[error("Empty session description in {0}")]
    EmptyDescription(&'static str),
}

/// The envelope exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: String,
}

/// Offer or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description plus its type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Network candidate descriptor, as exchanged with browsers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

/// Client-reported mute state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteUpdate {
    #[serde(default)]
    pub self_muted: bool,
    #[serde(default)]
    pub mic_muted: bool,
}

/// Decoded signaling message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Client -> server.
    SdpOffer(SessionDescription),
    /// Server -> client.
    SdpAnswer(SessionDescription),
    /// Both directions.
    IceCandidate(CandidateInit),
    /// Server -> client. Carries the departed client's id.
    ClientDisconnected(String),
    /// Client -> server.
    MuteChanged(MuteUpdate),
}

impl Signal {
    /// Wire discriminator for this message.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SdpOffer(_) => kind::SDP_OFFER,
            Self::SdpAnswer(_) => kind::SDP_ANSWER,
            Self::IceCandidate(_) => kind::ICE_CANDIDATE,
            Self::ClientDisconnected(_) => kind::CLIENT_DISCONNECTED,
            Self::MuteChanged(_) => kind::MUTE_CHANGED,
        }
    }

    /// Decode a text frame.
    ///
    /// `Ok(None)` means the envelope was well formed but of a kind this
    /// server does not handle.
    pub fn decode(text: &str) -> Result<Option<Self>, SignalError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(SignalError::Envelope)?;
        Self::from_raw(raw)
    }

    /// Decode the inner payload of an already parsed envelope.
    pub fn from_raw(raw: RawEnvelope) -> Result<Option<Self>, SignalError> {
        let signal = match raw.kind.as_str() {
            kind::SDP_OFFER => Self::SdpOffer(parse_description(
                kind::SDP_OFFER,
                SdpType::Offer,
                raw.data,
            )?),
            kind::SDP_ANSWER => Self::SdpAnswer(parse_description(
                kind::SDP_ANSWER,
                SdpType::Answer,
                raw.data,
            )?),
            kind::ICE_CANDIDATE => Self::IceCandidate(parse_json(kind::ICE_CANDIDATE, &raw.data)?),
            kind::CLIENT_DISCONNECTED => Self::ClientDisconnected(raw.data),
            kind::MUTE_CHANGED => Self::MuteChanged(parse_json(kind::MUTE_CHANGED, &raw.data)?),
            _ => return Ok(None),
        };

        Ok(Some(signal))
    }

    /// Encode into the wire envelope.
    ///
    /// Session descriptions travel as bare SDP text; the kind already
    /// implies the type tag.
    pub fn to_raw(&self) -> RawEnvelope {
        let data = match self {
            Self::SdpOffer(desc) | Self::SdpAnswer(desc) => desc.sdp.clone(),
            Self::IceCandidate(candidate) => json_string(candidate),
            Self::ClientDisconnected(client_id) => client_id.clone(),
            Self::MuteChanged(update) => json_string(update),
        };

        RawEnvelope {
            kind: self.kind().to_owned(),
            data,
        }
    }

    /// Encode into a text frame.
    pub fn encode(&self) -> String {
        json_string(&self.to_raw())
    }
}

/// Accepts either bare SDP text or a JSON `{type, sdp}` object.
fn parse_description(
    kind: &'static str,
    expected: SdpType,
    data: String,
) -> Result<SessionDescription, SignalError> {
    let description = if data.trim_start().starts_with('{') {
        let mut desc: SessionDescription = parse_json(kind, &data)?;
        desc.sdp_type = expected;
        desc
    } else {
        SessionDescription {
            sdp_type: expected,
            sdp: data,
        }
    };

    if description.sdp.trim().is_empty() {
        return Err(SignalError::EmptyDescription(kind));
    }

    Ok(description)
}

fn parse_json<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    data: &str,
) -> Result<T, SignalError> {
    serde_json::from_str(data).map_err(|source| SignalError::Payload { kind, source })
}

fn json_string<T: Serialize>(value: &T) -> String {
    // Plain structs of strings, numbers and booleans always serialize.
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDP: &str = "v=0\r\no=- 46117317 2 IN IP4 127.0.0.1\r\ns=-\r\n";

    #[test]
    fn test_decode_raw_sdp_offer() {
        let text = serde_json::json!({ "type": "sdpOffer", "data": SDP }).to_string();

        let signal = Signal::decode(&text).unwrap().unwrap();
        assert_eq!(signal, Signal::SdpOffer(SessionDescription::offer(SDP)));
    }

    #[test]
    fn test_decode_json_sdp_offer() {
        let inner = serde_json::json!({ "type": "offer", "sdp": SDP }).to_string();
        let text = serde_json::json!({ "type": "sdpOffer", "data": inner }).to_string();

        let signal = Signal::decode(&text).unwrap().unwrap();
        assert_eq!(signal, Signal::SdpOffer(SessionDescription::offer(SDP)));
    }

    #[test]
    fn test_empty_offer_is_rejected() {
        let text = r#"{"type":"sdpOffer","data":"  "}"#;

        assert!(matches!(
            Signal::decode(text),
            Err(SignalError::EmptyDescription("sdpOffer"))
        ));
    }

    #[test]
    fn test_decode_candidate() {
        let inner = r#"{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"abcd"}"#;
        let text = serde_json::json!({ "type": "iceCandidate", "data": inner }).to_string();

        let Some(Signal::IceCandidate(candidate)) = Signal::decode(&text).unwrap() else {
            panic!("expected a candidate");
        };
        assert!(candidate.candidate.starts_with("candidate:1"));
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert_eq!(candidate.username_fragment.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_candidate_optional_fields_default() {
        let text = serde_json::json!({
            "type": "iceCandidate",
            "data": r#"{"candidate":"candidate:2 1 udp 1 10.0.0.3 9 typ host"}"#,
        })
        .to_string();

        let Some(Signal::IceCandidate(candidate)) = Signal::decode(&text).unwrap() else {
            panic!("expected a candidate");
        };
        assert!(candidate.sdp_mid.is_none());
        assert!(candidate.sdp_mline_index.is_none());
    }

    #[test]
    fn test_malformed_candidate_is_payload_error() {
        let text = r#"{"type":"iceCandidate","data":"not json"}"#;

        assert!(matches!(
            Signal::decode(text),
            Err(SignalError::Payload { kind: "iceCandidate", .. })
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(
            Signal::decode("{\"data\": 1"),
            Err(SignalError::Envelope(_))
        ));
        assert!(matches!(
            Signal::decode("[1, 2, 3]"),
            Err(SignalError::Envelope(_))
        ));
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let text = r#"{"type":"screenShare","data":"{\"whatever\":true}"}"#;
        assert_eq!(Signal::decode(text).unwrap(), None);

        // data is optional on unknown kinds
        assert_eq!(Signal::decode(r#"{"type":"ping"}"#).unwrap(), None);
    }

    #[test]
    fn test_mute_update() {
        let text = r#"{"type":"muteChanged","data":"{\"selfMuted\":true}"}"#;

        let signal = Signal::decode(text).unwrap().unwrap();
        assert_eq!(
            signal,
            Signal::MuteChanged(MuteUpdate {
                self_muted: true,
                mic_muted: false,
            })
        );
    }

    #[test]
    fn test_encode_answer_as_bare_sdp() {
        let text = Signal::SdpAnswer(SessionDescription::answer(SDP)).encode();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "sdpAnswer");
        assert_eq!(value["data"], SDP);
    }

    #[test]
    fn test_encode_candidate_nests_json_string() {
        let signal = Signal::IceCandidate(CandidateInit {
            candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        });

        let value: serde_json::Value = serde_json::from_str(&signal.encode()).unwrap();
        assert_eq!(value["type"], "iceCandidate");

        let data = value["data"].as_str().unwrap();
        let inner: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(inner["sdpMid"], "0");
        assert_eq!(inner["sdpMLineIndex"], 0);
        assert!(inner["usernameFragment"].is_null());
    }

    #[test]
    fn test_encode_client_disconnected() {
        let text = Signal::ClientDisconnected("c0ffee".into()).encode();

        assert_eq!(text, r#"{"type":"clientDisconnected","data":"c0ffee"}"#);
    }
}
