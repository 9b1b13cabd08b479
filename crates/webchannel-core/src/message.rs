//! Message types exchanged over a shared channel.

use crate::connection::HandleId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique message identifier.
pub type MessageId = u64;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a process-unique message ID.
///
/// Consumers use the ID to recognise a duplicate delivery of a message they
/// already handled.
#[must_use]
pub fn generate_message_id() -> MessageId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Routing scope of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    /// Every live handle in the channel, the sender included.
    #[default]
    All,
    /// Every live handle in the channel except the sender.
    Broadcast,
}

impl RouteMode {
    /// Whether the sending handle is among the recipients.
    #[must_use]
    pub fn includes_sender(self) -> bool {
        matches!(self, RouteMode::All)
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMode::All => f.write_str("all"),
            RouteMode::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// A message sent through a channel.
///
/// With a `callback_key` the message is delivered to the handler registered
/// under that key on each recipient; without one it is published to the
/// channel's subject bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    #[serde(default = "generate_message_id")]
    pub id: MessageId,
    /// Routing scope.
    pub mode: RouteMode,
    /// Caller-defined tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Message payload.
    #[serde(default)]
    pub payload: Value,
    /// Key of the callback to invoke on recipients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_key: Option<String>,
    /// Sending handle, stamped by the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<HandleId>,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(mode: RouteMode, payload: impl Into<Value>) -> Self {
        Self {
            id: generate_message_id(),
            mode,
            action: None,
            payload: payload.into(),
            callback_key: None,
            source: None,
        }
    }

    /// Create a message delivered to every handle, the sender included.
    #[must_use]
    pub fn all(payload: impl Into<Value>) -> Self {
        Self::new(RouteMode::All, payload)
    }

    /// Create a message delivered to every handle except the sender.
    #[must_use]
    pub fn broadcast(payload: impl Into<Value>) -> Self {
        Self::new(RouteMode::Broadcast, payload)
    }

    /// Set the action tag.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Address the message to the callback registered under `key`.
    #[must_use]
    pub fn with_callback_key(mut self, key: impl Into<String>) -> Self {
        self.callback_key = Some(key.into());
        self
    }

    /// Set the sending handle.
    #[must_use]
    pub fn with_source(mut self, source: HandleId) -> Self {
        self.source = Some(source);
        self
    }

    /// Get the payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Whether this message targets a keyed callback rather than observers.
    #[must_use]
    pub fn is_callback(&self) -> bool {
        self.callback_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::broadcast("bg-red-500").with_callback_key("set-bg-color");
        assert_eq!(msg.mode, RouteMode::Broadcast);
        assert_eq!(msg.payload(), &json!("bg-red-500"));
        assert!(msg.is_callback());
        assert!(msg.source.is_none());
    }

    #[test]
    fn test_route_mode_sender_inclusion() {
        assert!(RouteMode::All.includes_sender());
        assert!(!RouteMode::Broadcast.includes_sender());
        assert_eq!(RouteMode::Broadcast.to_string(), "broadcast");
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message::all("broadcast").with_action("all");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["mode"], "all");
        assert_eq!(value["action"], "all");
        assert!(value.get("callbackKey").is_none());

        let parsed: Message = serde_json::from_value(json!({
            "mode": "broadcast",
            "payload": "bg-blue-500",
            "callbackKey": "set-bg-color"
        }))
        .unwrap();
        assert_eq!(parsed.callback_key.as_deref(), Some("set-bg-color"));
        assert_eq!(parsed.mode, RouteMode::Broadcast);
    }

    #[test]
    fn test_unique_message_ids() {
        let id1 = generate_message_id();
        let id2 = generate_message_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_message_ids_unique_across_threads() {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| (0..1_000).map(|_| generate_message_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut ids: Vec<MessageId> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
