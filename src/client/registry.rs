// Copyright (c) 2025 - Cowboy AI, Inc.
//! Listener and reference bookkeeping
//!
//! Keyed by fully qualified topic. A topic is referenced while it has bare
//! `subscribe` references or registered listeners; the two are counted
//! apart so releasing one kind never releases the other. The registry only
//! counts, the client turns count transitions into transport traffic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::payload::Payload;

/// Callback invoked with each message delivered on a topic
pub type Handler = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Identifies one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Listener {
    id: ListenerId,
    handler: Handler,
    once: bool,
}

/// Handlers selected for one inbound message
pub(crate) struct Dispatch {
    pub handlers: Vec<Handler>,
    /// One-shot listeners removed by this dispatch
    pub fired_once: usize,
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    subscriptions: HashMap<String, usize>,
    listeners: HashMap<String, Vec<Listener>>,
}

impl Registry {
    /// Take a bare reference on `topic`, returning the total it now holds
    pub fn acquire(&mut self, topic: &str) -> usize {
        *self.subscriptions.entry(topic.to_string()).or_insert(0) += 1;
        self.references(topic)
    }

    /// Drop a bare reference on `topic`
    ///
    /// Returns the total remaining, or `None` if the topic held no bare
    /// reference. Listener references are untouched.
    pub fn release(&mut self, topic: &str) -> Option<usize> {
        let count = self.subscriptions.get_mut(topic)?;
        *count -= 1;

        if *count == 0 {
            self.subscriptions.remove(topic);
        }

        Some(self.references(topic))
    }

    /// Bare references plus registered listeners
    pub fn references(&self, topic: &str) -> usize {
        self.subscriptions.get(topic).copied().unwrap_or(0) + self.listener_count(topic)
    }

    /// Register a listener; it references `topic` until removed
    pub fn attach(&mut self, topic: &str, handler: Handler, once: bool) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);

        self.listeners
            .entry(topic.to_string())
            .or_default()
            .push(Listener { id, handler, once });

        id
    }

    /// Remove a listener
    ///
    /// Returns false when the listener is not registered on `topic`.
    pub fn detach(&mut self, topic: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.listeners.get_mut(topic) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        let removed = listeners.len() < before;

        if listeners.is_empty() {
            self.listeners.remove(topic);
        }

        removed
    }

    /// Select the handlers for a message on `topic`
    ///
    /// One-shot listeners are removed before any handler runs, so a handler
    /// can never observe a second delivery.
    pub fn dispatch(&mut self, topic: &str) -> Dispatch {
        let Some(listeners) = self.listeners.get_mut(topic) else {
            return Dispatch {
                handlers: Vec::new(),
                fired_once: 0,
            };
        };

        let handlers = listeners
            .iter()
            .map(|listener| Arc::clone(&listener.handler))
            .collect();

        let before = listeners.len();
        listeners.retain(|listener| !listener.once);
        let fired_once = before - listeners.len();

        if listeners.is_empty() {
            self.listeners.remove(topic);
        }

        Dispatch {
            handlers,
            fired_once,
        }
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.listeners.get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> Handler {
        Arc::new(|_: &Payload| {})
    }

    #[test]
    fn test_references_count_up_and_down() {
        let mut registry = Registry::default();

        assert_eq!(registry.acquire("gesha/mode"), 1);
        assert_eq!(registry.acquire("gesha/mode"), 2);
        assert_eq!(registry.release("gesha/mode"), Some(1));
        assert_eq!(registry.release("gesha/mode"), Some(0));
        assert_eq!(registry.release("gesha/mode"), None);
        assert_eq!(registry.references("gesha/mode"), 0);
    }

    #[test]
    fn test_listener_holds_a_reference() {
        let mut registry = Registry::default();

        let id = registry.attach("gesha/mode", noop(), false);
        assert_eq!(registry.references("gesha/mode"), 1);
        assert_eq!(registry.listener_count("gesha/mode"), 1);

        assert!(registry.detach("gesha/mode", id));
        assert!(!registry.detach("gesha/mode", id));
        assert_eq!(registry.references("gesha/mode"), 0);
    }

    #[test]
    fn test_bare_release_leaves_listener_reference() {
        let mut registry = Registry::default();
        let id = registry.attach("gesha/mode", noop(), false);

        assert_eq!(registry.release("gesha/mode"), None);
        assert_eq!(registry.references("gesha/mode"), 1);

        assert_eq!(registry.acquire("gesha/mode"), 2);
        assert_eq!(registry.release("gesha/mode"), Some(1));
        assert_eq!(registry.release("gesha/mode"), None);

        assert!(registry.detach("gesha/mode", id));
        assert_eq!(registry.references("gesha/mode"), 0);
    }

    #[test]
    fn test_once_listener_removed_on_dispatch() {
        let mut registry = Registry::default();
        registry.attach("gesha/mode", noop(), false);
        registry.attach("gesha/mode", noop(), true);

        let dispatch = registry.dispatch("gesha/mode");
        assert_eq!(dispatch.handlers.len(), 2);
        assert_eq!(dispatch.fired_once, 1);

        let dispatch = registry.dispatch("gesha/mode");
        assert_eq!(dispatch.handlers.len(), 1);
        assert_eq!(dispatch.fired_once, 0);
        assert_eq!(registry.references("gesha/mode"), 1);
    }

    #[test]
    fn test_dispatch_selects_only_matching_topic() {
        let mut registry = Registry::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.attach(
            "gesha/mode",
            Arc::new(move |_: &Payload| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        );

        for handler in registry.dispatch("gesha/control_method").handlers {
            handler(&Payload::Text("PID".to_string()));
        }
        for handler in registry.dispatch("gesha/mode").handlers {
            handler(&Payload::Text("idle".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
