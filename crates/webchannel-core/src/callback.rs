//! Keyed callbacks owned by a connection handle.
//!
//! A message carrying a callback key is delivered to the handler registered
//! under that key on each recipient. Registering a key again replaces the
//! previous handler.

use crate::subject::invoke_isolated;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// A callback handler, invoked with the delivered payload.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Per-handle map of callback key to handler.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: DashMap<String, Callback>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `key`, replacing any existing handler.
    ///
    /// Returns `true` if a previous handler was replaced.
    pub fn register<F>(&self, key: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let key = key.into();
        let replaced = self.handlers.insert(key.clone(), Arc::new(handler)).is_some();
        if replaced {
            debug!(key = %key, "Callback replaced");
        } else {
            debug!(key = %key, "Callback registered");
        }
        replaced
    }

    /// Remove the handler for `key`.
    ///
    /// Returns `true` if a handler was removed.
    pub fn unregister(&self, key: &str) -> bool {
        self.handlers.remove(key).is_some()
    }

    /// Get the handler for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Callback> {
        self.handlers.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Invoke the handler for `key` with `payload`.
    ///
    /// Returns `false` when no handler is registered for `key`. A panicking
    /// handler is logged and reported as delivered.
    pub fn invoke(&self, key: &str, payload: &Value) -> bool {
        // The map guard must be released before the handler runs, the
        // handler may register or remove callbacks on this same registry.
        let Some(handler) = self.get(key) else {
            trace!(key = %key, "No callback registered");
            return false;
        };
        invoke_isolated(key, || handler(payload));
        true
    }

    /// Check if a handler is registered for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Get all registered keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
