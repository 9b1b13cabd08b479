//! Frame types for the webchannel hub protocol.
//!
//! A remote context (a browser tab, another process) drives its channel
//! handles on the hub with client frames; the hub answers with
//! acknowledgments and forwards deliveries as server frames. Each frame is
//! serialized using MessagePack.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webchannel_core::Message;

/// Error codes carried by [`Frame::Error`].
pub mod codes {
    /// Frame could not be decoded or is not valid from a client.
    pub const INVALID_FRAME: u16 = 1001;
    /// Joining the channel failed.
    pub const JOIN_FAILED: u16 = 1002;
    /// The connection has not joined the named channel.
    pub const NOT_JOINED: u16 = 1003;
    /// The channel handle was closed before the message could be sent.
    pub const SEND_ON_CLOSED: u16 = 1004;
    /// Client protocol version is not compatible.
    pub const UNSUPPORTED_VERSION: u16 = 1005;
}

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Hello,
    Join,
    Leave,
    Send,
    Register,
    Unregister,
    Observe,
    Unobserve,
    Ping,
    Pong,
    Connected,
    Ack,
    Error,
    Connections,
    Callback,
    Observed,
}

impl FrameType {
    /// Whether frames of this type are sent by clients.
    #[must_use]
    pub fn is_client(self) -> bool {
        matches!(
            self,
            FrameType::Hello
                | FrameType::Join
                | FrameType::Leave
                | FrameType::Send
                | FrameType::Register
                | FrameType::Unregister
                | FrameType::Observe
                | FrameType::Unobserve
                | FrameType::Ping
        )
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Opening handshake from a client.
    #[serde(rename = "hello")]
    Hello {
        /// Client protocol major version.
        version: u8,
    },

    /// Join a channel.
    #[serde(rename = "join")]
    Join {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name to join.
        channel: String,
    },

    /// Leave a channel.
    #[serde(rename = "leave")]
    Leave {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name to leave.
        channel: String,
    },

    /// Send a message through a joined channel.
    #[serde(rename = "send")]
    Send {
        /// Optional request ID for acknowledgment.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Channel the message is sent on.
        channel: String,
        /// The message.
        message: Message,
    },

    /// Register a callback key on a joined channel.
    #[serde(rename = "register")]
    Register {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name.
        channel: String,
        /// Callback key.
        key: String,
    },

    /// Remove a callback key.
    #[serde(rename = "unregister")]
    Unregister {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name.
        channel: String,
        /// Callback key.
        key: String,
    },

    /// Attach an observer to a joined channel.
    #[serde(rename = "observe")]
    Observe {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name.
        channel: String,
    },

    /// Detach the observer from a channel.
    #[serde(rename = "unobserve")]
    Unobserve {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name.
        channel: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Connection established.
    #[serde(rename = "connected")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Protocol major version.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Acknowledgment of a request.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged request.
        id: u64,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code, see [`codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Connection count of a joined channel changed.
    #[serde(rename = "connections")]
    Connections {
        /// Channel name.
        channel: String,
        /// Live connections in the channel.
        count: u64,
    },

    /// A registered callback was invoked.
    #[serde(rename = "callback")]
    Callback {
        /// Channel name.
        channel: String,
        /// Callback key.
        key: String,
        /// Delivered payload.
        payload: Value,
    },

    /// A message reached the connection's observer.
    #[serde(rename = "observed")]
    Observed {
        /// Channel name.
        channel: String,
        /// The full message.
        message: Message,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Hello { .. } => FrameType::Hello,
            Frame::Join { .. } => FrameType::Join,
            Frame::Leave { .. } => FrameType::Leave,
            Frame::Send { .. } => FrameType::Send,
            Frame::Register { .. } => FrameType::Register,
            Frame::Unregister { .. } => FrameType::Unregister,
            Frame::Observe { .. } => FrameType::Observe,
            Frame::Unobserve { .. } => FrameType::Unobserve,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Connections { .. } => FrameType::Connections,
            Frame::Callback { .. } => FrameType::Callback,
            Frame::Observed { .. } => FrameType::Observed,
        }
    }

    /// Create a new Hello frame.
    #[must_use]
    pub fn hello(version: u8) -> Self {
        Frame::Hello { version }
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(id: u64, channel: impl Into<String>) -> Self {
        Frame::Join {
            id,
            channel: channel.into(),
        }
    }

    /// Create a new Leave frame.
    #[must_use]
    pub fn leave(id: u64, channel: impl Into<String>) -> Self {
        Frame::Leave {
            id,
            channel: channel.into(),
        }
    }

    /// Create a new Send frame.
    #[must_use]
    pub fn send(channel: impl Into<String>, message: Message) -> Self {
        Frame::Send {
            id: None,
            channel: channel.into(),
            message,
        }
    }

    /// Create a new Send frame with ID for acknowledgment.
    #[must_use]
    pub fn send_with_ack(id: u64, channel: impl Into<String>, message: Message) -> Self {
        Frame::Send {
            id: Some(id),
            channel: channel.into(),
            message,
        }
    }

    /// Create a new Register frame.
    #[must_use]
    pub fn register(id: u64, channel: impl Into<String>, key: impl Into<String>) -> Self {
        Frame::Register {
            id,
            channel: channel.into(),
            key: key.into(),
        }
    }

    /// Create a new Unregister frame.
    #[must_use]
    pub fn unregister(id: u64, channel: impl Into<String>, key: impl Into<String>) -> Self {
        Frame::Unregister {
            id,
            channel: channel.into(),
            key: key.into(),
        }
    }

    /// Create a new Observe frame.
    #[must_use]
    pub fn observe(id: u64, channel: impl Into<String>) -> Self {
        Frame::Observe {
            id,
            channel: channel.into(),
        }
    }

    /// Create a new Unobserve frame.
    #[must_use]
    pub fn unobserve(id: u64, channel: impl Into<String>) -> Self {
        Frame::Unobserve {
            id,
            channel: channel.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: u8, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }

    /// Create a new Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a new Connections frame.
    #[must_use]
    pub fn connections(channel: impl Into<String>, count: usize) -> Self {
        Frame::Connections {
            channel: channel.into(),
            count: count as u64,
        }
    }

    /// Create a new Callback frame.
    #[must_use]
    pub fn callback(channel: impl Into<String>, key: impl Into<String>, payload: Value) -> Self {
        Frame::Callback {
            channel: channel.into(),
            key: key.into(),
            payload,
        }
    }

    /// Create a new Observed frame.
    #[must_use]
    pub fn observed(channel: impl Into<String>, message: Message) -> Self {
        Frame::Observed {
            channel: channel.into(),
            message,
        }
    }
}
