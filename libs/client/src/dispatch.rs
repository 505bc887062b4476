//! Typed event dispatch with per-listener cleanup handles.
//!
//! Listeners live on the dispatcher, not on the link, so registering before
//! the first connect (or between reconnects) needs no special casing: the
//! listener simply starts receiving once events flow.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use parlay_common::ServerEvent;

type Callback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

struct ListenerEntry {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    by_event: RwLock<HashMap<String, Vec<ListenerEntry>>>,
}

impl Listeners {
    fn remove(&self, event: &str, id: u64) {
        let mut by_event = self.by_event.write();
        if let Some(entries) = by_event.get_mut(event) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                by_event.remove(event);
            }
        }
    }
}

/// Cleanup handle returned by [`Dispatcher::on`].
///
/// Dropping the handle does not detach the listener; call [`remove`](Self::remove).
pub struct ListenerHandle {
    event: String,
    id: u64,
    active: Arc<AtomicBool>,
    listeners: Weak<Listeners>,
}

impl ListenerHandle {
    /// Detach the listener. No invocation starts after this returns; safe to
    /// call more than once.
    pub fn remove(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(&self.event, self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    listeners: Arc<Listeners>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events named `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.listeners
            .by_event
            .write()
            .entry(event.to_string())
            .or_default()
            .push(ListenerEntry {
                id,
                active: active.clone(),
                callback: Arc::new(callback),
            });

        ListenerHandle {
            event: event.to_string(),
            id,
            active,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver `payload` to every listener of `event` in registration order.
    ///
    /// A panicking listener is logged and skipped. Returns the number of
    /// listeners that completed normally.
    pub fn dispatch(&self, event: &str, payload: &ServerEvent) -> usize {
        // Snapshot so listeners can register or remove others re-entrantly.
        let snapshot: Vec<(Arc<AtomicBool>, Callback)> = match self.listeners.by_event.read().get(event) {
            Some(entries) => entries
                .iter()
                .map(|entry| (entry.active.clone(), entry.callback.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (active, callback) in snapshot {
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!(event, "listener panicked; continuing delivery"),
            }
        }
        delivered
    }

    /// Detach every listener.
    pub fn clear(&self) {
        let mut by_event = self.listeners.by_event.write();
        for entry in by_event.values().flatten() {
            entry.active.store(false, Ordering::SeqCst);
        }
        by_event.clear();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .by_event
            .read()
            .get(event)
            .map_or(0, Vec::len)
    }
}
