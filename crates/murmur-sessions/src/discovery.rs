//! Discovery loop — bootstrap the DHT, advertise under the rendezvous
//! string, then search until one connection succeeds or the session's
//! connection timeout expires.
//!
//! ```text
//! Bootstrapping → Advertising → Searching ⟲ → Connected
//!                                            ↘ TimedOut
//! ```
//!
//! Runs once per session. Every failure along the way is fatal.

use std::sync::Arc;

use futures::future::join_all;
use murmur_core::Event;
use serde::Serialize;
use tokio::time;

use crate::capability::DiscoveredPeer;
use crate::error::SessionError;
use crate::session::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    Bootstrapping,
    Advertising,
    Searching,
    Connected,
    TimedOut,
    Failed,
    /// The session shut down before discovery finished.
    Cancelled,
}

impl DiscoveryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DiscoveryState::Connected
                | DiscoveryState::TimedOut
                | DiscoveryState::Failed
                | DiscoveryState::Cancelled
        )
    }
}

pub(crate) async fn run(shared: Arc<Shared>) {
    let session = shared.handle;
    let timeout = shared.config.connection_timeout;

    let outcome = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => {
            shared.discovery.send_replace(DiscoveryState::Cancelled);
            tracing::trace!(session = %session, "discovery cancelled");
            return;
        }
        r = time::timeout(timeout, discover(&shared)) => r,
    };

    match outcome {
        Ok(Ok(connected)) => {
            shared.discovery.send_replace(DiscoveryState::Connected);
            tracing::info!(session = %session, connected, "peer discovery complete");
            shared.dispatch(Event::DiscoveryCompleted { session });
        }
        Ok(Err(e)) => {
            shared.discovery.send_replace(DiscoveryState::Failed);
            shared.report(e);
        }
        Err(_) => {
            shared.discovery.send_replace(DiscoveryState::TimedOut);
            shared.report(SessionError::DiscoveryTimeout(timeout));
        }
    }
}

/// Returns how many peers the successful round connected to.
async fn discover(shared: &Shared) -> Result<usize, SessionError> {
    let network = &shared.network;
    let rendezvous = shared.config.rendezvous_topic.as_str();
    let session = shared.handle;

    shared.discovery.send_replace(DiscoveryState::Bootstrapping);
    network.bootstrap().await.map_err(SessionError::Bootstrap)?;

    let dials = shared.config.bootstrap_peers.iter().map(|address| async move {
        match network.dial(address).await {
            Ok(()) => tracing::debug!(session = %session, address = %address, "bootstrap peer connected"),
            Err(e) => verbose!(shared, session = %session, address = %address, error = %e, "bootstrap dial failed"),
        }
    });
    join_all(dials).await;

    shared.discovery.send_replace(DiscoveryState::Advertising);
    network
        .advertise(rendezvous)
        .await
        .map_err(|source| SessionError::Advertise {
            rendezvous: rendezvous.to_string(),
            source,
        })?;

    shared.discovery.send_replace(DiscoveryState::Searching);
    let local = network.local_id();
    let mut round = 0u32;
    loop {
        round += 1;
        let peers = network
            .find_peers(rendezvous)
            .await
            .map_err(SessionError::PeerQuery)?;

        let candidates: Vec<&DiscoveredPeer> = peers.iter().filter(|p| p.id != local).collect();
        tracing::trace!(session = %session, round, candidates = candidates.len(), "search round");

        let attempts = candidates.into_iter().map(|peer| async move {
            match network.connect(peer).await {
                Ok(()) => {
                    tracing::debug!(session = %session, peer = %peer.id, "connected to peer");
                    true
                }
                Err(e) => {
                    verbose!(shared, session = %session, peer = %peer.id, error = %e, "peer connect failed");
                    false
                }
            }
        });
        let connected = join_all(attempts).await.into_iter().filter(|ok| *ok).count();
        if connected > 0 {
            return Ok(connected);
        }

        time::sleep(shared.config.search_backoff).await;
    }
}
