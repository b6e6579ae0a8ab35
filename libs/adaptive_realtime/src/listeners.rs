//! Subscriber Registry
//!
//! Callback sets shared by the monitors. Subscribing returns a
//! [`Subscription`] whose `unsubscribe` removes exactly that callback.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked synchronously with each published value
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ListenerMap<T> = RwLock<HashMap<u64, Listener<T>>>;

pub struct Listeners<T> {
    next_id: AtomicU64,
    entries: Arc<ListenerMap<T>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(id, listener);

        let entries: Weak<ListenerMap<T>> = Arc::downgrade(&self.entries);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(entries) = entries.upgrade() {
                    entries.write().remove(&id);
                }
            })),
        }
    }

    /// Invoke every listener. The lock is released before callbacks run so
    /// a listener may unsubscribe itself.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.entries.read().values().cloned().collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the subscription alive.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_and_unsubscribe() {
        let listeners: Listeners<u32> = Listeners::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let subscription = listeners.subscribe(Arc::new(move |value: &u32| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        }));

        listeners.publish(&3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        subscription.unsubscribe();
        listeners.publish(&3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let listeners: Listeners<u32> = Listeners::new();
        let subscription = listeners.subscribe(Arc::new(|_: &u32| {}));
        drop(listeners);
        subscription.unsubscribe();
    }

    #[test]
    fn test_clear_removes_everything() {
        let listeners: Listeners<u32> = Listeners::new();
        let _a = listeners.subscribe(Arc::new(|_: &u32| {}));
        let _b = listeners.subscribe(Arc::new(|_: &u32| {}));
        assert_eq!(listeners.len(), 2);
        listeners.clear();
        assert!(listeners.is_empty());
    }
}
