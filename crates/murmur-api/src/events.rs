//! Per-session event logs for HTTP clients.
//!
//! Every session opened through the API gets a bridge that appends each event
//! to a bounded queue keyed by session handle. Clients drain the queue by
//! polling `/sessions/{id}/events`; when a queue is full the oldest event is
//! dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use murmur_core::{Event, SessionHandle};
use murmur_sessions::EventBridge;

#[derive(Clone)]
pub struct EventLog {
    queues: Arc<DashMap<SessionHandle, VecDeque<Event>>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// A bridge that records every event kind into this log.
    pub fn bridge(&self) -> EventBridge {
        let bridge = EventBridge::new();
        let log = self.clone();
        bridge.register_all(move |event| {
            log.push(event.clone());
            true
        });
        bridge
    }

    pub fn push(&self, event: Event) {
        let mut queue = self.queues.entry(event.session()).or_default();
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
    }

    /// Take everything queued for `session`, oldest first.
    pub fn drain(&self, session: SessionHandle) -> Vec<Event> {
        self.queues
            .get_mut(&session)
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, session: SessionHandle) -> usize {
        self.queues.get(&session).map(|q| q.len()).unwrap_or(0)
    }

    pub fn forget(&self, session: SessionHandle) {
        self.queues.remove(&session);
    }
}
