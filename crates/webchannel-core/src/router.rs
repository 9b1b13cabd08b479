//! Message router.
//!
//! The router resolves the recipients of a message from its routing mode
//! and, per recipient, either invokes a keyed callback or publishes to the
//! channel's subject bus.

use crate::connection::{ConnectionHandle, HandleId};
use crate::error::ChannelError;
use crate::message::Message;
use crate::registry::ConnectionRegistry;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Dispatches messages between the handles of a channel.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    registry: ConnectionRegistry,
}

impl MessageRouter {
    /// Create a router over `registry`.
    #[must_use]
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Get the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Send `message` from `sender` to its channel.
    ///
    /// Delivery is fire-and-forget: recipients without a handler for the
    /// message's callback key are skipped silently, and handler failures are
    /// logged without reaching the sender.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SendOnClosedHandle`] if `sender` has
    /// disconnected. The message is dropped.
    pub fn send(&self, sender: &ConnectionHandle, message: Message) -> Result<(), ChannelError> {
        let closed = || {
            warn!(
                handle = %sender.id(),
                channel = %sender.channel(),
                "Send on closed handle, message dropped"
            );
            ChannelError::SendOnClosedHandle(sender.id())
        };

        if !sender.is_live() {
            return Err(closed());
        }

        let message = message.with_source(sender.id());
        let (recipients, subject) = self
            .registry
            .resolve(sender, message.mode)
            .ok_or_else(closed)?;

        if recipients.is_empty() {
            trace!(channel = %sender.channel(), mode = %message.mode, "No recipients");
            return Ok(());
        }

        let delivered = match message.callback_key.as_deref() {
            Some(key) => recipients
                .iter()
                .filter(|recipient| recipient.callbacks().invoke(key, &message.payload))
                .count(),
            None => {
                let ids: HashSet<HandleId> = recipients.iter().map(|h| h.id()).collect();
                subject.publish_to(&message, &ids)
            }
        };

        debug!(
            channel = %sender.channel(),
            handle = %sender.id(),
            mode = %message.mode,
            callback_key = message.callback_key.as_deref().unwrap_or("-"),
            recipients = recipients.len(),
            delivered,
            "Message routed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RouteMode;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn record(handle: &ConnectionHandle, key: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handle
            .callbacks()
            .register(key, move |p| sink.lock().push(p.clone()));
        seen
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("default").unwrap();
        let b = router.registry().connect("default").unwrap();
        let a_seen = record(&a, "set-bg-color");
        let b_seen = record(&b, "set-bg-color");

        router
            .send(
                &a,
                Message::broadcast("bg-red-500").with_callback_key("set-bg-color"),
            )
            .unwrap();

        assert!(a_seen.lock().is_empty());
        assert_eq!(*b_seen.lock(), vec![json!("bg-red-500")]);
    }

    #[test]
    fn test_all_includes_sender() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("default").unwrap();
        let b = router.registry().connect("default").unwrap();
        let a_seen = record(&a, "set-bg-color");
        let b_seen = record(&b, "set-bg-color");

        router
            .send(&a, Message::all("bg-blue-500").with_callback_key("set-bg-color"))
            .unwrap();

        assert_eq!(*a_seen.lock(), vec![json!("bg-blue-500")]);
        assert_eq!(*b_seen.lock(), vec![json!("bg-blue-500")]);
    }

    #[test]
    fn test_callback_key_must_match() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("default").unwrap();
        let b = router.registry().connect("default").unwrap();
        let b_seen = record(&b, "set-bg-color");

        router
            .send(&a, Message::all("x").with_callback_key("other-key"))
            .unwrap();
        router.send(&a, Message::all("y")).unwrap();

        assert!(b_seen.lock().is_empty());
    }

    #[test]
    fn test_messages_stay_in_channel() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("channel-1").unwrap();
        let c = router.registry().connect("channel-2").unwrap();
        let c_seen = record(&c, "key");

        router
            .send(&a, Message::all(1).with_callback_key("key"))
            .unwrap();

        assert!(c_seen.lock().is_empty());
    }

    #[test]
    fn test_send_on_closed_handle() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("default").unwrap();
        router.registry().disconnect(&a);

        assert!(matches!(
            router.send(&a, Message::new(RouteMode::All, Value::Null)),
            Err(ChannelError::SendOnClosedHandle(id)) if id == a.id()
        ));
    }

    #[test]
    fn test_observer_receives_stamped_message() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("default").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router
            .registry()
            .observe(&a, Arc::new(move |m: &Message| sink.lock().push(m.clone())))
            .unwrap();

        router.send(&a, Message::all("hello")).unwrap();
        router.send(&a, Message::broadcast("hidden")).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source, Some(a.id()));
        assert_eq!(seen[0].payload, json!("hello"));
    }

    #[test]
    fn test_per_sender_order() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("default").unwrap();
        let b = router.registry().connect("default").unwrap();
        let b_seen = record(&b, "seq");

        for n in 0..10 {
            router
                .send(&a, Message::broadcast(n).with_callback_key("seq"))
                .unwrap();
        }

        let expected: Vec<Value> = (0..10).map(|n| json!(n)).collect();
        assert_eq!(*b_seen.lock(), expected);
    }

    #[test]
    fn test_handler_may_send() {
        let router = MessageRouter::new(ConnectionRegistry::new());
        let a = router.registry().connect("default").unwrap();
        let b = router.registry().connect("default").unwrap();
        let a_seen = record(&a, "pong");

        let reply_router = router.clone();
        let reply_from = b.clone();
        b.callbacks().register("ping", move |p| {
            let reply = Message::broadcast(p.clone()).with_callback_key("pong");
            reply_router.send(&reply_from, reply).unwrap();
        });

        router
            .send(&a, Message::broadcast("hi").with_callback_key("ping"))
            .unwrap();

        assert_eq!(*a_seen.lock(), vec![json!("hi")]);
    }
}
