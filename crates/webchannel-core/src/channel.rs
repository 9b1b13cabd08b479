//! Channel abstraction.
//!
//! A channel is a named group of connection handles plus one subject bus.
//! Channels are created by the registry on first connect and released when
//! their last handle disconnects.

use crate::connection::{ConnectionHandle, HandleId};
use crate::message::RouteMode;
use crate::subject::SubjectBus;
use tracing::debug;

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Name used when a context joins without naming a channel.
pub const DEFAULT_CHANNEL_NAME: &str = "default";

/// A channel identifier.
pub type ChannelId = String;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.starts_with('$') {
        return Err("Channel names starting with '$' are reserved");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// A named channel and its live members.
#[derive(Debug)]
pub struct Channel {
    /// Channel name.
    name: ChannelId,
    /// Live handles, in join order.
    members: Vec<ConnectionHandle>,
    /// Observer stream for this channel.
    subject: SubjectBus,
}

impl Channel {
    /// Create an empty channel.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>) -> Self {
        let name = name.into();
        Self {
            subject: SubjectBus::new(name.clone()),
            name,
            members: Vec::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the channel's subject bus.
    #[must_use]
    pub fn subject(&self) -> &SubjectBus {
        &self.subject
    }

    /// Number of live handles.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    /// Check if a handle is a member.
    #[must_use]
    pub fn is_member(&self, id: HandleId) -> bool {
        self.members.iter().any(|h| h.id() == id)
    }

    /// Add a handle.
    pub fn add(&mut self, handle: ConnectionHandle) {
        debug!(channel = %self.name, handle = %handle.id(), "Handle joined");
        self.members.push(handle);
    }

    /// Remove a handle.
    ///
    /// Returns the removed handle, if it was a member.
    pub fn remove(&mut self, id: HandleId) -> Option<ConnectionHandle> {
        let index = self.members.iter().position(|h| h.id() == id)?;
        let handle = self.members.remove(index);
        self.subject.remove_owner(id);
        debug!(channel = %self.name, handle = %id, "Handle left");
        Some(handle)
    }

    /// Get all live handles.
    #[must_use]
    pub fn members(&self) -> Vec<ConnectionHandle> {
        self.members.clone()
    }

    /// Resolve the recipients of a message sent by `sender`.
    #[must_use]
    pub fn recipients(&self, sender: HandleId, mode: RouteMode) -> Vec<ConnectionHandle> {
        self.members
            .iter()
            .filter(|h| mode.includes_sender() || h.id() != sender)
            .cloned()
            .collect()
    }

    /// Check if the channel has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
