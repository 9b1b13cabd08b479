//! # webchannel-protocol
//!
//! Wire protocol between remote contexts and the webchannel hub.
//!
//! A context that lives outside the hub process drives its channel handles
//! with frames and receives deliveries the same way.
//!
//! ## Frame Types
//!
//! - `Hello` / `Connected` - Handshake and version check
//! - `Join` / `Leave` - Channel membership
//! - `Send` - Route a message through a joined channel
//! - `Register` / `Unregister` / `Callback` - Keyed callbacks
//! - `Observe` / `Unobserve` / `Observed` - Observer subscription
//! - `Connections` - Membership count updates
//! - `Ack` / `Error` - Acknowledgments and errors
//!
//! ## Example
//!
//! ```rust
//! use webchannel_core::Message;
//! use webchannel_protocol::{codec, Frame};
//!
//! let frame = Frame::send(
//!     "default",
//!     Message::broadcast("bg-red-500").with_callback_key("set-bg-color"),
//! );
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{codes, Frame, FrameType};
pub use version::{Version, PROTOCOL_VERSION};
