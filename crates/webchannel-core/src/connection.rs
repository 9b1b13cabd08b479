//! Connection handles.
//!
//! A handle is one execution context's membership token in a channel. It is
//! created by the registry on connect and moves through
//! `Connecting → Active → Closed`; `Closed` is terminal.

use crate::callback::CallbackRegistry;
use crate::channel::ChannelId;
use crate::subject::invoke_isolated;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u64);

impl HandleId {
    /// Allocate a new process-unique handle ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Liveness of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, not yet a member of its channel.
    Connecting,
    /// Member of its channel.
    Active,
    /// Disconnected. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether a handle in this state counts towards its channel's connections.
    #[must_use]
    pub fn is_live(self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

/// A connection-count listener.
pub type ConnectionsListener = Arc<dyn Fn(usize) + Send + Sync>;

struct HandleInner {
    id: HandleId,
    channel: ChannelId,
    state: Mutex<ConnectionState>,
    callbacks: CallbackRegistry,
    listeners: Mutex<Vec<ConnectionsListener>>,
    last_count: AtomicUsize,
}

/// One context's membership in a named channel.
///
/// The handle refers to its channel by name only; the channel's lifetime is
/// governed by the registry's handle set. Cloning yields another reference to
/// the same membership.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    pub(crate) fn new(channel: impl Into<ChannelId>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: HandleId::generate(),
                channel: channel.into(),
                state: Mutex::new(ConnectionState::Connecting),
                callbacks: CallbackRegistry::new(),
                listeners: Mutex::new(Vec::new()),
                last_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the handle ID.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    /// Get the name of the channel this handle belongs to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether the handle is connecting or active.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Get this handle's callbacks.
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.inner.callbacks
    }

    /// Register a listener for the channel's connection count.
    ///
    /// The listener fires on every membership change in the channel. A live
    /// handle replays the most recent count to the new listener immediately.
    pub fn on_connections_update<F>(&self, listener: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let listener: ConnectionsListener = Arc::new(listener);
        self.inner.listeners.lock().push(Arc::clone(&listener));

        if self.is_live() {
            let count = self.inner.last_count.load(Ordering::Acquire);
            invoke_isolated(format!("{}-connections", self.inner.id), || listener(count));
        }
    }

    /// Number of registered connection-count listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Move from `Connecting` to `Active`.
    pub(crate) fn activate(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Active;
            true
        } else {
            false
        }
    }

    /// Move to `Closed`.
    ///
    /// Returns `false` if the handle was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state == ConnectionState::Closed {
            return false;
        }
        *state = ConnectionState::Closed;
        debug!(handle = %self.inner.id, channel = %self.inner.channel, "Handle closed");
        true
    }

    /// Deliver a new connection count to every listener.
    pub(crate) fn notify_connections(&self, count: usize) {
        self.inner.last_count.store(count, Ordering::Release);
        let listeners: Vec<ConnectionsListener> = self.inner.listeners.lock().clone();
        trace!(
            handle = %self.inner.id,
            count,
            listeners = listeners.len(),
            "Connections update"
        );
        for listener in listeners {
            invoke_isolated(format!("{}-connections", self.inner.id), || listener(count));
        }
    }

    /// Drop every callback and listener held by this handle.
    pub(crate) fn release(&self) {
        self.inner.callbacks.clear();
        self.inner.listeners.lock().clear();
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("channel", &self.inner.channel)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_state_machine() {
        let handle = ConnectionHandle::new("default");
        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert!(handle.is_live());

        assert!(handle.activate());
        assert!(!handle.activate());
        assert_eq!(handle.state(), ConnectionState::Active);

        assert!(handle.close());
        assert!(!handle.close());
        assert_eq!(handle.state(), ConnectionState::Closed);

        // No way back from Closed.
        assert!(!handle.activate());
        assert!(!handle.is_live());
    }

    #[test]
    fn test_unique_handle_ids() {
        let a = ConnectionHandle::new("default");
        let b = ConnectionHandle::new("default");
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_listener_replays_last_count() {
        let handle = ConnectionHandle::new("default");
        handle.activate();
        handle.notify_connections(3);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handle.on_connections_update(move |n| sink.lock().push(n));
        handle.notify_connections(2);

        assert_eq!(*seen.lock(), vec![3, 2]);
    }

    #[test]
    fn test_release_clears_handlers() {
        let handle = ConnectionHandle::new("default");
        handle.callbacks().register("key", |_| {});
        handle.on_connections_update(|_| {});

        handle.release();
        assert!(handle.callbacks().is_empty());
        assert_eq!(handle.listener_count(), 0);
    }

    #[test]
    fn test_handle_id_display() {
        assert_eq!(HandleId(7).to_string(), "handle-7");
    }
}
