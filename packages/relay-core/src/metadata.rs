//! Standard metadata conventions carried on every message envelope.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Well-known metadata keys every transport must preserve.
///
/// A message envelope carries at minimum the message-type full name, the
/// content type of the body, the message intent, and a correlation id linking
/// it back to the inbound message that produced it.
pub mod keys {
    /// Full name of the message type, used to resolve handlers and routes.
    pub const MESSAGE_TYPE: &str = "relay.message-type";
    /// MIME-style content type of the opaque body.
    pub const CONTENT_TYPE: &str = "content-type";
    /// Message intent: `Send`, `Publish`, or `Reply`.
    pub const MESSAGE_INTENT: &str = "relay.intent";
    /// Id of the inbound message this message correlates with.
    pub const CORRELATION_ID: &str = "relay.correlation-id";
}

/// Classification of an outbound message.
///
/// `Send` is point-to-point, `Publish` is a broadcast to all subscribers, and
/// `Reply` answers an inbound message. A `Reply` resolves its destination
/// through the same path as `Send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageIntent {
    Send,
    Publish,
    Reply,
}

impl MessageIntent {
    /// String form stored under [`keys::MESSAGE_INTENT`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageIntent::Send => "Send",
            MessageIntent::Publish => "Publish",
            MessageIntent::Reply => "Reply",
        }
    }
}

impl fmt::Display for MessageIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an intent metadata value is not one of the known forms.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown message intent '{0}'")]
pub struct UnknownIntent(pub String);

impl FromStr for MessageIntent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Send" => Ok(MessageIntent::Send),
            "Publish" => Ok(MessageIntent::Publish),
            "Reply" => Ok(MessageIntent::Reply),
            other => Err(UnknownIntent(other.to_string())),
        }
    }
}
