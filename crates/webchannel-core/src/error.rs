//! Error types for shared channels.

use crate::connection::HandleId;
use thiserror::Error;

/// Channel errors.
///
/// None of these are fatal: a failed operation leaves the registry and every
/// other connection untouched.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Empty or malformed channel name.
    #[error("Invalid channel name: {0}")]
    InvalidChannelName(&'static str),

    /// Message sent through a handle that has already disconnected.
    #[error("Cannot send on closed handle {0}")]
    SendOnClosedHandle(HandleId),

    /// Operation on a handle that is no longer a member of its channel.
    #[error("Handle {0} is closed")]
    HandleClosed(HandleId),

    /// Maximum number of channels reached.
    #[error("Maximum channels reached")]
    MaxChannelsReached,

    /// Channel already holds the maximum number of connections.
    #[error("Channel is full: {0}")]
    ChannelFull(String),

    /// An observer or callback panicked while handling a delivery.
    ///
    /// Only ever logged; delivery to the remaining handlers continues.
    #[error("Observer {subscription} failed: {reason}")]
    ObserverInvocationFailure {
        /// Subscription or callback key that failed.
        subscription: String,
        /// Panic message, if one could be recovered.
        reason: String,
    },
}
