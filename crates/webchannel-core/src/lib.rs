//! # webchannel-core
//!
//! Shared channels: named groups of execution contexts that track live
//! membership and exchange messages.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Per-channel sets of live connection handles
//! - **Router** - `all` / `broadcast` fan-out of messages
//! - **Callbacks** - Keyed request handlers on each handle
//! - **Subject** - Observer-style publish/subscribe per channel
//! - **SharedChannel** - The handle-bearing object a context holds
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐     ┌─────────────┐     ┌───────────────────┐
//! │ SharedChannel │────▶│   Router    │────▶│ CallbackRegistry  │
//! └───────────────┘     └─────────────┘     └───────────────────┘
//!         │                    │
//!         ▼                    ▼
//! ┌───────────────┐     ┌─────────────┐
//! │   Registry    │     │ SubjectBus  │
//! └───────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use webchannel_core::{ConnectionRegistry, Message, SharedChannel};
//!
//! let registry = ConnectionRegistry::new();
//! let a = SharedChannel::join_default(&registry).unwrap();
//! let b = SharedChannel::join_default(&registry).unwrap();
//!
//! b.register_callback("set-bg-color", |color| println!("now {color}"));
//! a.send_message(Message::broadcast("bg-red-500").with_callback_key("set-bg-color"))
//!     .unwrap();
//!
//! assert_eq!(a.connections(), 2);
//! ```

pub mod callback;
pub mod channel;
pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod router;
pub mod shared;
pub mod subject;

pub use callback::{Callback, CallbackRegistry};
pub use channel::{validate_channel_name, Channel, ChannelId, DEFAULT_CHANNEL_NAME};
pub use connection::{ConnectionHandle, ConnectionState, HandleId};
pub use error::ChannelError;
pub use message::{Message, MessageId, RouteMode};
pub use registry::{ConnectionRegistry, RegistryConfig, RegistryStats};
pub use router::MessageRouter;
pub use shared::{Observer, SharedChannel};
pub use subject::{ObserverFn, SubjectBus, Subscription, SubscriptionId};
