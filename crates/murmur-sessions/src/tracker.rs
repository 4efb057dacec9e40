//! Peer tracking — synthesizes connect/disconnect events by polling topic
//! membership and diffing consecutive snapshots.

use std::collections::BTreeSet;
use std::sync::Arc;

use murmur_core::{Event, PeerId};
use tokio::time::{self, MissedTickBehavior};

use crate::session::Shared;

/// Peers that appeared and vanished between two snapshots, each sorted by id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerDiff {
    pub added: Vec<PeerId>,
    pub removed: Vec<PeerId>,
}

impl PeerDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Holds the previous snapshot.
#[derive(Debug, Default)]
pub struct PeerTracker {
    previous: BTreeSet<PeerId>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the previous snapshot with `snapshot` and return the diff.
    pub fn update(&mut self, snapshot: BTreeSet<PeerId>) -> PeerDiff {
        let added = snapshot.difference(&self.previous).cloned().collect();
        let removed = self.previous.difference(&snapshot).cloned().collect();
        self.previous = snapshot;
        PeerDiff { added, removed }
    }

    pub fn current(&self) -> &BTreeSet<PeerId> {
        &self.previous
    }
}

/// Poll every joined topic each period until the session is cancelled.
pub(crate) async fn run(shared: Arc<Shared>) {
    let mut interval = time::interval(shared.config.peer_poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let session = shared.handle;

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let topics = shared.topics.lock().await.joined_topics();
        let mut snapshot = BTreeSet::new();
        for topic in topics {
            snapshot.extend(topic.list_peers().await);
        }
        if shared.cancel.is_cancelled() {
            break;
        }

        let diff = shared.peers.lock().await.update(snapshot);
        if !diff.is_empty() {
            tracing::debug!(
                session = %session,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "peer membership changed"
            );
        }

        for peer in diff.added {
            if !shared.dispatch(Event::PeerConnected { session, peer }) {
                return;
            }
        }
        for peer in diff.removed {
            if !shared.dispatch(Event::PeerDisconnected { session, peer }) {
                return;
            }
        }
    }
    tracing::trace!(session = %session, "peer tracker stopped");
}
