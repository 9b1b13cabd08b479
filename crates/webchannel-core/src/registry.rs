//! Connection registry.
//!
//! The registry owns every channel, keyed by name. It creates a channel on
//! the first connect, releases it when the last handle disconnects, and
//! notifies the members of a channel whenever its membership changes.

use crate::channel::{validate_channel_name, Channel, ChannelId};
use crate::connection::{ConnectionHandle, HandleId};
use crate::error::ChannelError;
use crate::message::RouteMode;
use crate::subject::{ObserverFn, SubjectBus, Subscription};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of channels.
    pub max_channels: usize,
    /// Maximum live handles per channel.
    pub max_connections_per_channel: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_channels: 10_000,
            max_connections_per_channel: 10_000,
        }
    }
}

struct RegistryInner {
    /// Channels indexed by name.
    channels: DashMap<ChannelId, Channel>,
    /// Configuration.
    config: RegistryConfig,
}

/// Tracks the live handles of every channel.
///
/// There is no process-wide instance: create a registry and pass it to every
/// context that should share channels. Cloning yields another reference to
/// the same registry.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating connection registry with config: {:?}", config);
        Self {
            inner: Arc::new(RegistryInner {
                channels: DashMap::new(),
                config,
            }),
        }
    }

    /// Get the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Join `channel_name`, creating the channel if needed.
    ///
    /// Every member of the channel, the new handle included, is notified of
    /// the new connection count.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel name is invalid or limits are exceeded.
    pub fn connect(&self, channel_name: &str) -> Result<ConnectionHandle, ChannelError> {
        self.connect_with_subject(channel_name).map(|(handle, _)| handle)
    }

    pub(crate) fn connect_with_subject(
        &self,
        channel_name: &str,
    ) -> Result<(ConnectionHandle, SubjectBus), ChannelError> {
        validate_channel_name(channel_name).map_err(ChannelError::InvalidChannelName)?;

        let channels = &self.inner.channels;
        let config = &self.inner.config;

        if !channels.contains_key(channel_name) && channels.len() >= config.max_channels {
            return Err(ChannelError::MaxChannelsReached);
        }

        let (handle, subject, members) = {
            let mut entry = channels.entry(channel_name.to_string()).or_insert_with(|| {
                debug!(channel = %channel_name, "Creating new channel");
                Channel::new(channel_name)
            });

            if entry.connection_count() >= config.max_connections_per_channel {
                return Err(ChannelError::ChannelFull(channel_name.to_string()));
            }

            let handle = ConnectionHandle::new(channel_name);
            entry.add(handle.clone());
            handle.activate();
            (handle, entry.subject().clone(), entry.members())
        };

        debug!(
            channel = %channel_name,
            handle = %handle.id(),
            connections = members.len(),
            "Connected"
        );
        notify(&members);

        Ok((handle, subject))
    }

    /// Leave the handle's channel.
    ///
    /// The handle becomes `Closed` and releases its callbacks, listeners and
    /// observers. The remaining members are notified of the new count and the
    /// channel is released once empty.
    ///
    /// Returns `false` if the handle was already closed.
    pub fn disconnect(&self, handle: &ConnectionHandle) -> bool {
        if !handle.close() {
            return false;
        }

        let channel_name = handle.channel();
        let remaining = match self.inner.channels.get_mut(channel_name) {
            Some(mut entry) => {
                entry.remove(handle.id());
                let members = entry.members();
                if entry.is_empty() {
                    drop(entry); // Release the lock
                    self.inner
                        .channels
                        .remove_if(channel_name, |_, channel| channel.is_empty());
                    debug!(channel = %channel_name, "Released empty channel");
                }
                members
            }
            None => Vec::new(),
        };

        handle.release();
        debug!(
            channel = %channel_name,
            handle = %handle.id(),
            connections = remaining.len(),
            "Disconnected"
        );
        notify(&remaining);

        true
    }

    /// Number of live handles in a channel.
    #[must_use]
    pub fn count(&self, channel_name: &str) -> usize {
        self.inner
            .channels
            .get(channel_name)
            .map(|e| e.connection_count())
            .unwrap_or(0)
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn channel_exists(&self, channel_name: &str) -> bool {
        self.inner.channels.contains_key(channel_name)
    }

    /// Get all channel names.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.inner.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Get the live handles of a channel.
    #[must_use]
    pub fn members(&self, channel_name: &str) -> Vec<ConnectionHandle> {
        self.inner
            .channels
            .get(channel_name)
            .map(|e| e.members())
            .unwrap_or_default()
    }

    /// Get a channel's subject bus.
    #[must_use]
    pub fn subject(&self, channel_name: &str) -> Option<SubjectBus> {
        self.inner
            .channels
            .get(channel_name)
            .map(|e| e.subject().clone())
    }

    /// Attach an observer on behalf of `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::HandleClosed`] if the handle is no longer a
    /// member of its channel.
    pub fn observe(
        &self,
        handle: &ConnectionHandle,
        observer: ObserverFn,
    ) -> Result<Subscription, ChannelError> {
        // Checked under the channel lock so a concurrent disconnect either
        // sees this subscription or rejects it.
        match self.inner.channels.get(handle.channel()) {
            Some(entry) if entry.is_member(handle.id()) => {
                Ok(entry.subject().subscribe_owned(handle.id(), observer))
            }
            _ => Err(ChannelError::HandleClosed(handle.id())),
        }
    }

    /// Resolve the recipients of a message from `sender`.
    ///
    /// Returns `None` if the sender is not a member of its channel.
    pub(crate) fn resolve(
        &self,
        sender: &ConnectionHandle,
        mode: RouteMode,
    ) -> Option<(Vec<ConnectionHandle>, SubjectBus)> {
        let entry = self.inner.channels.get(sender.channel())?;
        if !entry.is_member(sender.id()) {
            return None;
        }
        Some((entry.recipients(sender.id(), mode), entry.subject().clone()))
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            channel_count: self.inner.channels.len(),
            connection_count: self
                .inner
                .channels
                .iter()
                .map(|e| e.connection_count())
                .sum(),
        }
    }

    /// Check whether a handle is currently a member of its channel.
    #[must_use]
    pub fn is_connected(&self, id: HandleId, channel_name: &str) -> bool {
        self.inner
            .channels
            .get(channel_name)
            .is_some_and(|e| e.is_member(id))
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Deliver the membership count to a snapshot of a channel's members.
///
/// Runs after the channel lock is released, listeners may call back into
/// the registry.
fn notify(members: &[ConnectionHandle]) {
    let count = members.len();
    for handle in members {
        handle.notify_connections(count);
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live channels.
    pub channel_count: usize,
    /// Number of live handles across all channels.
    pub connection_count: usize,
}
