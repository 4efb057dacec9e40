//! murmur integration test harness.
//!
//! Every test runs whole sessions through a `SessionRegistry` on an
//! in-process `MemoryHub`, so no network access is needed:
//!
//!   cargo test --test integration
//!
//! Each test owns its hub, so tests can run in parallel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use murmur_core::{Event, SessionHandle, TopicHandle};
use murmur_sessions::{EventBridge, FatalReport, MemoryHub, SessionConfig, SessionRegistry};
use tokio::sync::mpsc;

mod discovery;
mod failures;
mod messaging;
mod sessions;
mod topics;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

pub struct Net {
    pub hub: MemoryHub,
    pub registry: SessionRegistry,
    pub fatal: mpsc::UnboundedReceiver<FatalReport>,
}

/// A registry on a fresh hub.
pub fn net() -> Net {
    let hub = MemoryHub::new();
    let (registry, fatal) = SessionRegistry::new(Arc::new(hub.clone()));
    Net {
        hub,
        registry,
        fatal,
    }
}

/// Fast loops, no bootstrap peers, a timeout long enough not to fire
/// unless a test asks for it.
pub fn config(listen: &str, rendezvous: &str) -> SessionConfig {
    SessionConfig::new(listen, rendezvous)
        .with_bootstrap_peers(Vec::new())
        .with_timeout_secs(30.0)
        .with_peer_poll_interval(Duration::from_millis(20))
        .with_search_backoff(Duration::from_millis(10))
}

/// Every event a session dispatches, in order.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn bridge(&self) -> EventBridge {
        let bridge = EventBridge::new();
        let events = self.events.clone();
        bridge.register_all(move |e| {
            events.lock().unwrap().push(e.clone());
            true
        });
        bridge
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// Wait until `pred` holds for the recorded events.
    pub async fn wait_for(&self, pred: impl Fn(&[Event]) -> bool) {
        tokio::time::timeout(WAIT, async {
            loop {
                if pred(self.events.lock().unwrap().as_slice()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out; recorded {:?}", self.events()));
    }
}

/// Open a session whose events land in a fresh [`Recorder`].
pub async fn open(
    registry: &SessionRegistry,
    config: SessionConfig,
) -> (SessionHandle, Recorder) {
    let recorder = Recorder::default();
    let handle = registry
        .create_with_bridge(config, recorder.bridge())
        .await
        .expect("session should open");
    (handle, recorder)
}

pub fn left(session: SessionHandle, topic: u32) -> Event {
    Event::TopicLeft {
        session,
        topic: TopicHandle(topic),
    }
}

pub fn joined(session: SessionHandle, topic: u32) -> Event {
    Event::TopicJoined {
        session,
        topic: TopicHandle(topic),
    }
}
