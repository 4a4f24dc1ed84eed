//! Inbound events and outbound frames of the stream protocol.
//!
//! Inbound frames are JSON objects keyed by `type`. Known types decode to
//! typed variants; anything else is kept verbatim in [`Event::Other`] so
//! new event types pass through untouched.
//!
//! Outbound frames always carry an `id` assigned by the sender context.
//! Requests created by the application ([`OutboundRequest`]) have no id
//! until they are stamped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `message` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageEvent {
    /// Channel the message was posted in.
    #[serde(default)]
    pub channel: Option<String>,
    /// Author user id. Absent for bot and system messages.
    #[serde(default)]
    pub user: Option<String>,
    /// Message text.
    #[serde(default)]
    pub text: Option<String>,
    /// Message timestamp (also its id within the channel).
    #[serde(default)]
    pub ts: Option<String>,
    /// Message subtype (`bot_message`, `message_changed`, ...).
    #[serde(default)]
    pub subtype: Option<String>,
    /// Set when the message replays one of our own sends.
    #[serde(default)]
    pub reply_to: Option<u64>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl MessageEvent {
    /// Returns `true` for a fresh message written by a user.
    ///
    /// Replays of our own sends carry `reply_to` and are excluded.
    #[must_use]
    pub fn is_from_user(&self) -> bool {
        self.reply_to.is_none()
            && self.user.as_deref().is_some_and(|u| !u.is_empty())
            && self.channel.is_some()
    }
}

/// Acknowledgement of one of our outbound frames (no `type` field).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ack {
    /// Id of the outbound frame being acknowledged.
    pub reply_to: u64,
    /// Whether the remote accepted the frame.
    #[serde(default)]
    pub ok: bool,
    /// Timestamp assigned to the accepted message.
    #[serde(default)]
    pub ts: Option<String>,
    /// Echoed text.
    #[serde(default)]
    pub text: Option<String>,
    /// Error record when `ok` is false.
    #[serde(default)]
    pub error: Option<Value>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Stream is live. Always the first frame.
    Hello,
    /// Remote is about to close the stream.
    Goodbye,
    /// Reply to one of our keepalive pings.
    Pong {
        /// Id of the ping being answered.
        reply_to: Option<u64>,
    },
    /// Chat message.
    Message(MessageEvent),
    /// Acknowledgement of an outbound frame.
    Ack(Ack),
    /// Any other typed event, kept verbatim.
    Other {
        /// Value of the `type` field.
        kind: String,
        /// Full decoded payload.
        raw: Value,
    },
    /// A frame with neither `type` nor `reply_to`.
    Untyped(Value),
}

impl Event {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(raw))
    }

    /// Classify an already-parsed payload.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        let kind = raw.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("hello") => Self::Hello,
            Some("goodbye") => Self::Goodbye,
            Some("pong") => Self::Pong {
                reply_to: raw.get("reply_to").and_then(Value::as_u64),
            },
            Some("message") => match MessageEvent::deserialize(&raw) {
                Ok(message) => Self::Message(message),
                Err(e) => {
                    log::debug!("Keeping malformed message event raw: {e}");
                    Self::Other {
                        kind: "message".to_string(),
                        raw,
                    }
                }
            },
            Some(other) => Self::Other {
                kind: other.to_string(),
                raw,
            },
            None if raw.get("reply_to").is_some() => match Ack::deserialize(&raw) {
                Ok(ack) => Self::Ack(ack),
                Err(_) => Self::Untyped(raw),
            },
            None => Self::Untyped(raw),
        }
    }

    /// The event's `type` tag (`"ack"` / `""` for the untyped variants).
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Hello => "hello",
            Self::Goodbye => "goodbye",
            Self::Pong { .. } => "pong",
            Self::Message(_) => "message",
            Self::Ack(_) => "ack",
            Self::Other { kind, .. } => kind,
            Self::Untyped(_) => "",
        }
    }

    /// Returns `true` for the hello event.
    #[must_use]
    pub fn is_hello(&self) -> bool {
        matches!(self, Self::Hello)
    }

    /// Returns `true` for keepalive replies.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        matches!(self, Self::Pong { .. })
    }
}

/// An application request waiting for a sequence id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundRequest {
    /// Post text to a channel.
    Message {
        /// Target channel id.
        channel: String,
        /// Text, already truncated.
        text: String,
    },
    /// Show the typing indicator in a channel.
    Typing {
        /// Target channel id.
        channel: String,
    },
}

impl OutboundRequest {
    /// Build a message request, truncating `text` to `max_chars` characters.
    pub fn message(channel: impl Into<String>, text: &str, max_chars: usize) -> Self {
        Self::Message {
            channel: channel.into(),
            text: truncate_chars(text, max_chars).to_string(),
        }
    }

    /// Attach the sequence id, producing the wire frame.
    #[must_use]
    pub fn stamp(self, id: u64) -> OutboundFrame {
        match self {
            Self::Message { channel, text } => OutboundFrame::Message { id, channel, text },
            Self::Typing { channel } => OutboundFrame::Typing { id, channel },
        }
    }
}

/// A frame as written to the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Keepalive probe.
    Ping {
        /// Sequence id.
        id: u64,
    },
    /// Chat message.
    Message {
        /// Sequence id.
        id: u64,
        /// Target channel id.
        channel: String,
        /// Message text.
        text: String,
    },
    /// Typing indicator.
    Typing {
        /// Sequence id.
        id: u64,
        /// Target channel id.
        channel: String,
    },
}

impl OutboundFrame {
    /// Sequence id of this frame.
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::Ping { id } | Self::Message { id, .. } | Self::Typing { id, .. } => *id,
        }
    }

    /// Returns `true` for keepalive probes.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping { .. })
    }

    /// Serialize to the JSON text sent on the stream.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Longest prefix of `text` with at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
