//! Event dispatch bridge — one host callback per event kind.

use std::sync::Arc;

use dashmap::DashMap;
use murmur_core::{Event, EventKind};

/// A host callback. Returning `false` rejects the event, which the
/// dispatching activity treats as fatal.
pub type Callback = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Callback bindings for one session. Cloning shares the bindings.
#[derive(Clone, Default)]
pub struct EventBridge {
    callbacks: Arc<DashMap<EventKind, Callback>>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` to `kind`, replacing any previous binding.
    /// Returns the replaced callback.
    pub fn register<F>(&self, kind: EventKind, callback: F) -> Option<Callback>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.callbacks.insert(kind, Arc::new(callback))
    }

    /// Bind one callback to every kind.
    pub fn register_all<F>(&self, callback: F)
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        for kind in EventKind::ALL {
            self.callbacks.insert(kind, callback.clone());
        }
    }

    pub fn unregister(&self, kind: EventKind) -> bool {
        self.callbacks.remove(&kind).is_some()
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    pub fn clear(&self) {
        self.callbacks.clear();
    }

    /// Forward `event` to its callback. A kind with no callback counts as
    /// acknowledged.
    pub fn dispatch(&self, event: &Event) -> bool {
        // Clone out so the shard lock is released before host code runs.
        let callback = self.callbacks.get(&event.kind()).map(|c| c.value().clone());
        match callback {
            Some(callback) => callback(event),
            None => true,
        }
    }
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<EventKind> = self.callbacks.iter().map(|e| *e.key()).collect();
        kinds.sort();
        f.debug_struct("EventBridge").field("registered", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::SessionHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn closed() -> Event {
        Event::SessionClosed {
            session: SessionHandle::new(0, 0),
        }
    }

    #[test]
    fn missing_callback_acknowledges() {
        let bridge = EventBridge::new();
        assert!(bridge.dispatch(&closed()));
    }

    #[test]
    fn reregistering_replaces() {
        let bridge = EventBridge::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        assert!(bridge
            .register(EventKind::SessionClosed, move |_| {
                f.fetch_add(1, Ordering::SeqCst);
                true
            })
            .is_none());
        let s = second.clone();
        assert!(bridge
            .register(EventKind::SessionClosed, move |_| {
                s.fetch_add(1, Ordering::SeqCst);
                true
            })
            .is_some());

        bridge.dispatch(&closed());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejection_is_reported() {
        let bridge = EventBridge::new();
        bridge.register(EventKind::SessionClosed, |_| false);
        assert!(!bridge.dispatch(&closed()));

        bridge.unregister(EventKind::SessionClosed);
        assert!(bridge.dispatch(&closed()));
    }

    #[test]
    fn register_all_binds_every_kind() {
        let bridge = EventBridge::new();
        bridge.register_all(|_| true);
        for kind in EventKind::ALL {
            assert!(bridge.is_registered(kind));
        }
        bridge.clear();
        assert!(!bridge.is_registered(EventKind::TopicJoined));
    }
}
