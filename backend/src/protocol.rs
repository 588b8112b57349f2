use crate::game::input::Direction;
use crate::game::types::{CaptureState, PlayerState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session negotiation envelope. Tried before the game envelope on every inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalMessage {
    pub fn known_kind(&self) -> Option<SignalKind> {
        match self.kind.as_str() {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "iceCandidate" => Some(SignalKind::IceCandidate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    Move(Direction),
    Capture,
    Chat(Option<String>),
    Join {
        name: Option<String>,
        color: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown message type {0:?}")]
    UnknownType(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct MovePayload {
    #[serde(alias = "Direction")]
    direction: Direction,
}

#[derive(Debug, Default, Deserialize)]
struct JoinPayload {
    name: Option<String>,
    color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPayload {
    message: Option<String>,
}

pub fn decode_signal(data: &[u8]) -> Option<SignalMessage> {
    serde_json::from_slice(data).ok()
}

pub fn decode_game_message(data: &[u8]) -> Result<GameMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(data).map_err(DecodeError::Envelope)?;
    match envelope.kind.as_str() {
        "move" => {
            let payload: MovePayload = payload_or_default("move", envelope.payload, None)?;
            Ok(GameMessage::Move(payload.direction))
        }
        "capture" => Ok(GameMessage::Capture),
        "chat" => {
            let payload: ChatPayload =
                payload_or_default("chat", envelope.payload, Some(ChatPayload::default()))?;
            Ok(GameMessage::Chat(payload.message))
        }
        "join" => {
            let payload: JoinPayload =
                payload_or_default("join", envelope.payload, Some(JoinPayload::default()))?;
            Ok(GameMessage::Join {
                name: payload.name,
                color: payload.color,
            })
        }
        _ => Err(DecodeError::UnknownType(envelope.kind)),
    }
}

fn payload_or_default<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    payload: Value,
    fallback: Option<T>,
) -> Result<T, DecodeError> {
    if payload.is_null() {
        if let Some(fallback) = fallback {
            return Ok(fallback);
        }
    }
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload { kind, source })
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    UpdatePlayer(PlayerState),
    CaptureTerritory(CaptureState),
    RemovePlayer(PlayerState),
}

pub fn encode_server_message(message: &ServerMessage) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(message)
}

pub fn encode_signal(signal: &SignalMessage) -> serde_json::Result<String> {
    serde_json::to_string(signal)
}
