//! Explicit observer registration for session notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Parent-window scroll, already shifted into iframe coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollEvent {
    pub scroll_top: i64,
    pub window_height: i64,
}

/// Host SDK initialisation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    InitSuccess,
    InitFailed(String),
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A list of listeners for one event type.
pub struct Subscribers<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(Subscription, Listener<E>)>>,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<E> Subscribers<E> {
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` when the subscription was not registered.
    pub fn unsubscribe(&self, id: Subscription) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener in registration order. Listeners run
    /// outside the lock, so they may subscribe or unsubscribe.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in snapshot {
            listener(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Subscription, Listener<E>)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
