//! Event dispatch for the shared connection.
//!
//! The chat backend's protocol is name-addressed. A flat callback table
//! holding one listener per event name lets a second registration silently
//! clobber the first, so dispatch is multiplexed instead: one
//! fan-in per event name, fanning out to handlers keyed by subscriber, so
//! independent features can listen to the same event. Replace semantics
//! remain available, but only for an explicitly keyed re-subscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

#[cfg(not(target_arch = "wasm32"))]
type Handler = Arc<dyn Fn(&Value) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type Handler = Arc<dyn Fn(&Value)>;

/// stamp -> distinguishes a registration from a keyed replacement that
/// reused its key.
type Registry = HashMap<String, HashMap<String, (u64, Handler)>>;

#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

/// Removes its registration on drop (or explicit `unsubscribe`).
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    event: String,
    key: String,
    stamp: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a fresh subscriber key; never displaces
    /// anyone else's registration.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn subscribe(
        &self,
        event: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let key = format!("#{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.register(event, key, Arc::new(handler))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn subscribe(&self, event: &str, handler: impl Fn(&Value) + 'static) -> Subscription {
        let key = format!("#{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.register(event, key, Arc::new(handler))
    }

    /// Register under an explicit subscriber key; re-registering the same
    /// key replaces the previous handler. This is the intentional form of
    /// the old single-listener behavior.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn subscribe_keyed(
        &self,
        event: &str,
        key: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(event, key.to_string(), Arc::new(handler))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn subscribe_keyed(
        &self,
        event: &str,
        key: &str,
        handler: impl Fn(&Value) + 'static,
    ) -> Subscription {
        self.register(event, key.to_string(), Arc::new(handler))
    }

    fn register(&self, event: &str, key: String, handler: Handler) -> Subscription {
        let stamp = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.registry
            .lock()
            .expect("dispatcher registry poisoned")
            .entry(event.to_string())
            .or_default()
            .insert(key.clone(), (stamp, handler));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            event: event.to_string(),
            key,
            stamp,
        }
    }

    /// Fan an event out to every registered handler. Returns how many
    /// handlers ran.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        // Clone the handlers out so none of them can deadlock by
        // re-entering the dispatcher.
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().expect("dispatcher registry poisoned");
            registry
                .get(event)
                .map(|subs| subs.values().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in &handlers {
            handler(data);
        }
        handlers.len()
    }
}

impl Subscription {
    pub fn unsubscribe(self) {}

    fn remove(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().expect("dispatcher registry poisoned");
        if let Some(subs) = registry.get_mut(&self.event) {
            // A keyed replacement reuses the key with a newer stamp; its
            // registration is not ours to remove.
            if subs.get(&self.key).is_some_and(|(stamp, _)| *stamp == self.stamp) {
                subs.remove(&self.key);
            }
            if subs.is_empty() {
                registry.remove(&self.event);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter_handler(counter: &Arc<AtomicUsize>) -> impl Fn(&Value) + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fans_out_to_every_subscriber() {
        let dispatcher = Dispatcher::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let _sub_a = dispatcher.subscribe("chat:global", counter_handler(&a));
        let _sub_b = dispatcher.subscribe("chat:global", counter_handler(&b));

        assert_eq!(dispatcher.dispatch("chat:global", &json!({})), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn keyed_resubscribe_replaces_instead_of_stacking() {
        let dispatcher = Dispatcher::new();
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));
        let _first = dispatcher.subscribe_keyed("users:online", "session", counter_handler(&old));
        let _second = dispatcher.subscribe_keyed("users:online", "session", counter_handler(&new));

        assert_eq!(dispatcher.dispatch("users:online", &json!([])), 1);
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_stale_keyed_subscription_leaves_the_replacement_alone() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let first = dispatcher.subscribe_keyed("users:online", "session", |_| {});
        let _second = dispatcher.subscribe_keyed("users:online", "session", counter_handler(&hits));

        drop(first);
        assert_eq!(dispatcher.dispatch("users:online", &json!([])), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let sub = dispatcher.subscribe("chat:typing", counter_handler(&hits));
        assert_eq!(dispatcher.dispatch("chat:typing", &json!({})), 1);

        sub.unsubscribe();
        assert_eq!(dispatcher.dispatch("chat:typing", &json!({})), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatching_an_unknown_event_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.dispatch("no:subscribers", &Value::Null), 0);
    }
}
