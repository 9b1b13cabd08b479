//! Subject bus: observer-style publish/subscribe for a channel.
//!
//! Observers receive every message published on the bus, independent of
//! callback keys, in subscription order. A panicking observer is logged and
//! skipped; the remaining observers still receive the message.

use crate::connection::HandleId;
use crate::error::ChannelError;
use crate::message::Message;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// An observer, invoked with each published message.
pub type ObserverFn = Arc<dyn Fn(&Message) + Send + Sync>;

/// A subscription identifier, unique within its bus.
pub type SubscriptionId = u64;

/// Run a handler, containing any panic it raises.
///
/// Returns `false` if the handler panicked.
pub(crate) fn invoke_isolated(label: impl fmt::Display, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let err = ChannelError::ObserverInvocationFailure {
                subscription: label.to_string(),
                reason,
            };
            warn!(error = %err, "Handler failed, continuing delivery");
            false
        }
    }
}

struct Slot {
    id: SubscriptionId,
    owner: Option<HandleId>,
    observer: ObserverFn,
}

struct BusInner {
    channel: String,
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        before != slots.len()
    }

    fn contains(&self, id: SubscriptionId) -> bool {
        self.slots.lock().iter().any(|slot| slot.id == id)
    }
}

/// A channel's observer stream.
///
/// Cloning a bus yields another reference to the same stream.
#[derive(Clone)]
pub struct SubjectBus {
    inner: Arc<BusInner>,
}

impl SubjectBus {
    /// Create an empty bus for `channel`.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channel: channel.into(),
                slots: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Get the channel this bus belongs to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Attach an observer that receives every message published on the bus.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.attach(None, Arc::new(observer))
    }

    /// Attach an observer on behalf of a connection handle.
    ///
    /// Routed messages only reach it when `owner` is among the recipients,
    /// and it is removed when `owner` disconnects.
    pub(crate) fn subscribe_owned(&self, owner: HandleId, observer: ObserverFn) -> Subscription {
        self.attach(Some(owner), observer)
    }

    fn attach(&self, owner: Option<HandleId>, observer: ObserverFn) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots.lock().push(Slot {
            id,
            owner,
            observer,
        });
        debug!(channel = %self.inner.channel, subscription = id, "Observer subscribed");
        Subscription {
            id,
            owner,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Detach an observer.
    ///
    /// Returns `true` if it was still subscribed. Detaching twice is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let removed = self.inner.remove(subscription.id);
        if removed {
            debug!(
                channel = %self.inner.channel,
                subscription = subscription.id,
                "Observer unsubscribed"
            );
        }
        removed
    }

    /// Publish a message to every subscribed observer.
    ///
    /// Returns the number of observers that handled the message without
    /// panicking.
    pub fn publish(&self, message: &Message) -> usize {
        self.deliver(message, |_| true)
    }

    /// Publish a routed message.
    ///
    /// Observers owned by a handle only fire when that handle is a
    /// recipient; unowned observers always fire.
    pub(crate) fn publish_to(&self, message: &Message, recipients: &HashSet<HandleId>) -> usize {
        self.deliver(message, |owner| match owner {
            Some(id) => recipients.contains(&id),
            None => true,
        })
    }

    fn deliver(&self, message: &Message, accepts: impl Fn(Option<HandleId>) -> bool) -> usize {
        // Snapshot under the lock, invoke without it: observers may
        // subscribe or unsubscribe while handling the message.
        let targets: Vec<(SubscriptionId, ObserverFn)> = self
            .inner
            .slots
            .lock()
            .iter()
            .filter(|slot| accepts(slot.owner))
            .map(|slot| (slot.id, Arc::clone(&slot.observer)))
            .collect();

        trace!(
            channel = %self.inner.channel,
            message = message.id,
            observers = targets.len(),
            "Publishing message"
        );

        targets
            .into_iter()
            .filter(|(id, observer)| {
                invoke_isolated(format!("subscription-{id}"), || observer(message))
            })
            .count()
    }

    /// Remove every observer owned by `owner`.
    ///
    /// Returns the number of removed observers.
    pub(crate) fn remove_owner(&self, owner: HandleId) -> usize {
        let mut slots = self.inner.slots.lock();
        let before = slots.len();
        slots.retain(|slot| slot.owner != Some(owner));
        before - slots.len()
    }

    /// Number of subscribed observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Check if no observers are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.slots.lock().is_empty()
    }
}

impl fmt::Debug for SubjectBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectBus")
            .field("channel", &self.inner.channel)
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// A disposable observer subscription.
///
/// Dropping a subscription does not detach the observer; call
/// [`Subscription::unsubscribe`] or let the owning handle disconnect.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    owner: Option<HandleId>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Get the subscription ID.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Get the handle that owns this subscription, if any.
    #[must_use]
    pub fn owner(&self) -> Option<HandleId> {
        self.owner
    }

    /// Detach the observer from its bus.
    ///
    /// Returns `true` if it was still subscribed. Idempotent.
    pub fn unsubscribe(&self) -> bool {
        self.bus.upgrade().is_some_and(|bus| bus.remove(self.id))
    }

    /// Check if the observer is still attached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.bus.upgrade().is_some_and(|bus| bus.contains(self.id))
    }
}
