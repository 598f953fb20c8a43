//! Wire protocol: the typed envelope exchanged over the room channel.
//!
//! Every message is `{"type": ..., "data": ..., "timestamp"?: ...}`
//! with a closed set of kinds. Unknown kinds and malformed payloads
//! fail decoding; the session logs and drops them, so a newer peer
//! cannot take an older client down.

use chrono::{DateTime, Utc};
use kurbo::Affine;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::image::{ImageId, WireImage};
use crate::presence::Presence;
use crate::stroke::WireStroke;

/// A wire message: a typed payload plus an optional send timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Wrap a payload, stamped with the current time.
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            timestamp: Some(Utc::now()),
        }
    }
}

/// The closed set of message kinds. Sender identity rides inside each
/// payload rather than on the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// A completed stroke.
    #[serde(rename_all = "camelCase")]
    Stroke {
        user_id: String,
        user_name: String,
        stroke: WireStroke,
    },
    /// A newly placed image, data included.
    #[serde(rename_all = "camelCase")]
    ImageAdd { user_id: String, image: WireImage },
    /// An absolute transform for an already-shared image.
    #[serde(rename_all = "camelCase")]
    ImageUpdate {
        user_id: String,
        id: ImageId,
        transform: Affine,
    },
    #[serde(rename_all = "camelCase")]
    ImageRemove { user_id: String, id: ImageId },
    /// Wipe all strokes and images.
    #[serde(rename_all = "camelCase")]
    ClearCanvas { user_id: String },
    PresenceUpdate(Presence),
    #[serde(rename_all = "camelCase")]
    Ping { user_id: String },
    #[serde(rename_all = "camelCase")]
    Pong { user_id: String },
}

impl Payload {
    /// Sender identity carried inside the payload.
    pub fn user_id(&self) -> &str {
        match self {
            Payload::Stroke { user_id, .. }
            | Payload::ImageAdd { user_id, .. }
            | Payload::ImageUpdate { user_id, .. }
            | Payload::ImageRemove { user_id, .. }
            | Payload::ClearCanvas { user_id }
            | Payload::Ping { user_id }
            | Payload::Pong { user_id } => user_id,
            Payload::PresenceUpdate(presence) => &presence.user_id,
        }
    }
}

/// Serialize an envelope for the wire.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(|err| ProtocolError::Encode(err.to_string()))
}

/// Parse a wire message. Unknown kinds and malformed payloads are
/// errors for the caller to log and drop.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str(text).map_err(|err| ProtocolError::Malformed(err.to_string()))
}
