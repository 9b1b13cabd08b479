//! Shared channel facade.
//!
//! [`SharedChannel`] is what an execution context holds: it joins a named
//! channel on construction and leaves it when dropped, so a context that
//! goes away without calling [`SharedChannel::disconnect`] is still removed
//! from the channel.

use crate::channel::DEFAULT_CHANNEL_NAME;
use crate::connection::ConnectionHandle;
use crate::error::ChannelError;
use crate::message::Message;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;
use crate::subject::{SubjectBus, Subscription};
use serde_json::Value;
use std::sync::Arc;

/// One context's view of a named channel.
#[derive(Debug)]
pub struct SharedChannel {
    router: MessageRouter,
    handle: ConnectionHandle,
    subject: SubjectBus,
}

impl SharedChannel {
    /// Join `name` in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the registry is at capacity.
    pub fn join(registry: &ConnectionRegistry, name: &str) -> Result<Self, ChannelError> {
        let (handle, subject) = registry.connect_with_subject(name)?;
        Ok(Self {
            router: MessageRouter::new(registry.clone()),
            handle,
            subject,
        })
    }

    /// Join the default channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is at capacity.
    pub fn join_default(registry: &ConnectionRegistry) -> Result<Self, ChannelError> {
        Self::join(registry, DEFAULT_CHANNEL_NAME)
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.channel()
    }

    /// Get the underlying connection handle.
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Get the channel's subject bus.
    #[must_use]
    pub fn subject(&self) -> &SubjectBus {
        &self.subject
    }

    /// Send a message to the channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SendOnClosedHandle`] after disconnect.
    pub fn send_message(&self, message: Message) -> Result<(), ChannelError> {
        self.router.send(&self.handle, message)
    }

    /// Register `handler` for messages carrying `key`, replacing any previous
    /// handler for that key.
    pub fn register_callback<F>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.handle.callbacks().register(key, handler);
    }

    /// Remove the handler for `key`.
    pub fn unregister_callback(&self, key: &str) -> bool {
        self.handle.callbacks().unregister(key)
    }

    /// Register a listener for this channel's connection count.
    ///
    /// The listener is called immediately with the current count, then on
    /// every membership change.
    pub fn on_connections_update<F>(&self, listener: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.handle.on_connections_update(listener);
    }

    /// Current number of live connections in this channel.
    ///
    /// Zero once this context has disconnected.
    #[must_use]
    pub fn connections(&self) -> usize {
        if self.handle.is_live() {
            self.router.registry().count(self.name())
        } else {
            0
        }
    }

    /// Leave the channel.
    ///
    /// Returns `false` if already disconnected.
    pub fn disconnect(&self) -> bool {
        self.router.registry().disconnect(&self.handle)
    }
}

impl Drop for SharedChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// An observer attached to a shared channel.
///
/// It receives every message routed to its channel's context without a
/// callback key, until [`Observer::unsubscribe`] or the channel disconnects.
#[derive(Debug)]
pub struct Observer {
    subscription: Subscription,
}

impl Observer {
    /// Attach `handler` to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::HandleClosed`] if the channel has disconnected.
    pub fn new<F>(channel: &SharedChannel, handler: F) -> Result<Self, ChannelError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let subscription = channel
            .router
            .registry()
            .observe(&channel.handle, Arc::new(handler))?;
        Ok(Self { subscription })
    }

    /// Get the underlying subscription.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Detach from the channel. Idempotent.
    pub fn unsubscribe(&self) -> bool {
        self.subscription.unsubscribe()
    }

    /// Check if still attached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_default() {
        let registry = ConnectionRegistry::new();
        let channel = SharedChannel::join_default(&registry).unwrap();
        assert_eq!(channel.name(), DEFAULT_CHANNEL_NAME);
        assert_eq!(channel.connections(), 1);
    }

    #[test]
    fn test_drop_disconnects() {
        let registry = ConnectionRegistry::new();
        let a = SharedChannel::join(&registry, "tabs").unwrap();
        {
            let _b = SharedChannel::join(&registry, "tabs").unwrap();
            assert_eq!(a.connections(), 2);
        }
        assert_eq!(a.connections(), 1);
    }

    #[test]
    fn test_disconnect_then_send() {
        let registry = ConnectionRegistry::new();
        let channel = SharedChannel::join(&registry, "tabs").unwrap();

        assert!(channel.disconnect());
        assert!(!channel.disconnect());
        assert_eq!(channel.connections(), 0);
        assert!(!registry.channel_exists("tabs"));
        assert!(matches!(
            channel.send_message(Message::all("late")),
            Err(ChannelError::SendOnClosedHandle(_))
        ));
    }

    #[test]
    fn test_observer_after_disconnect() {
        let registry = ConnectionRegistry::new();
        let channel = SharedChannel::join(&registry, "tabs").unwrap();
        channel.disconnect();

        assert!(matches!(
            Observer::new(&channel, |_| {}),
            Err(ChannelError::HandleClosed(_))
        ));
    }

    #[test]
    fn test_unregister_callback() {
        let registry = ConnectionRegistry::new();
        let channel = SharedChannel::join(&registry, "tabs").unwrap();
        channel.register_callback("key", |_| {});
        assert!(channel.unregister_callback("key"));
        assert!(!channel.unregister_callback("key"));
    }
}
