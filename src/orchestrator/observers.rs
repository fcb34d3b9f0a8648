//! View change subscriptions

use super::state::SessionView;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub type Listener = Arc<dyn Fn(&SessionView) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    entries: DashMap<u64, Listener>,
    next_id: AtomicU64,
}

/// Registered view listeners
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Listeners>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.insert(id, listener);
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver one snapshot to every live listener, in subscription order.
    /// Listeners run without any registry lock held, so they may subscribe
    /// or unsubscribe from inside the callback.
    pub fn emit(&self, view: &SessionView) {
        let mut listeners: Vec<(u64, Listener)> = self
            .inner
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);

        for (_, listener) in listeners {
            listener(view);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

/// Handle returned by `subscribe`; dropping it also unsubscribes
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.entries.remove(&self.id);
        }
    }
}
