//! Transport-agnostic message envelope.
//!
//! A [`RawMessage`] is the unit every transport sends and receives: a string
//! id, an opaque byte body, and an insertion-ordered metadata map. The runtime
//! never interprets the body; routing decisions are made from metadata alone.

use serde::{Deserialize, Serialize};

use crate::metadata::{keys, MessageIntent, UnknownIntent};

/// Insertion-ordered string map for message metadata.
///
/// Keys keep the position of their first insertion; inserting an existing key
/// replaces the value in place. Lookups are linear, which is fine for the
/// handful of entries an envelope carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMap {
    entries: Vec<(String, String)>,
}

impl MetadataMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value. Replacement keeps the key's original
    /// position so iteration order stays stable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The wire-shape message exchanged with transports.
///
/// Immutable once handed to a transport for transmission. The body is opaque
/// to the runtime; its encoding is described by the `content-type` metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub message_id: String,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    pub metadata: MetadataMap,
}

impl RawMessage {
    /// Creates a message with an empty metadata map.
    #[must_use]
    pub fn new(message_id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_id: message_id.into(),
            body,
            metadata: MetadataMap::new(),
        }
    }

    /// Builder-style metadata insertion.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// The message-type full name, if the envelope carries one.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.metadata.get(keys::MESSAGE_TYPE)
    }

    /// The correlation id, if the envelope carries one.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.get(keys::CORRELATION_ID)
    }

    /// Parses the message intent from metadata.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownIntent`] when the value is absent or not one of the
    /// known intent forms.
    pub fn intent(&self) -> Result<MessageIntent, UnknownIntent> {
        self.metadata
            .get(keys::MESSAGE_INTENT)
            .ok_or_else(|| UnknownIntent(String::new()))?
            .parse()
    }
}
