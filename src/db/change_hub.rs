use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
};

use tokio_util::sync::CancellationToken;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct HubInner {
    listeners: Mutex<HashMap<u64, Listener>>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl HubInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<u64, Listener>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Change-notification channel owned by one store.
///
/// Created when the application is composed and handed to both the store (which signals
/// after each committed mutation) and the live broadcaster (which listens).
#[derive(Clone, Default)]
pub struct ChangeHub {
    inner: Arc<HubInner>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; it runs synchronously on the notifying task, so keep it cheap.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Subscription::inert();
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().insert(id, Arc::new(listener));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    pub fn notify(&self) {
        if self.is_closed() {
            return;
        }
        // Call outside the lock so listeners may subscribe or unsubscribe.
        let listeners: Vec<Listener> = self.inner.listeners().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }

    /// Drop every listener and refuse new ones.
    pub fn close(&self) {
        self.inner.closed.cancel();
        self.inner.listeners().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Cancelled once the hub closes; long-lived listeners select on it.
    pub fn closed_token(&self) -> CancellationToken {
        self.inner.closed.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

/// Revokes its listener when dropped or explicitly unsubscribed.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<HubInner>,
    id: Option<u64>,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            hub: Weak::new(),
            id: None,
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(hub)) = (self.id.take(), self.hub.upgrade()) {
            hub.listeners().remove(&id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
