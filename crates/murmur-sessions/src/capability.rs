//! The network capability a session drives.
//!
//! A session never touches sockets, DHT records or gossip meshes itself. It
//! asks a [`NetworkFactory`] for one [`Network`] bound to its identity and
//! listen address, and from then on only needs to:
//!
//!   - dial addresses and connect to discovered peers
//!   - bootstrap a DHT, advertise under a rendezvous string, and find peers
//!     advertising the same string
//!   - join a topic, yielding a [`PubsubTopic`] to publish on and a
//!     [`Subscription`] to read from
//!   - list the peers currently visible on a topic
//!
//! `murmur-net` implements this over libp2p; [`crate::memory`] implements it
//! in-process.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use murmur_core::{Identity, PeerId, PubsubMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network initialisation failed: {0}")]
    Init(String),
    #[error("invalid address {0:?}: {1}")]
    Address(String, String),
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("dht: {0}")]
    Dht(String),
    #[error("pubsub: {0}")]
    Pubsub(String),
    #[error("network is closed")]
    Closed,
}

/// Everything a factory needs to build one session's network.
#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub listen_address: String,
    pub identity: Identity,
    pub pubsub_mode: PubsubMode,
    pub verbose: bool,
}

/// A peer returned by a rendezvous query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub id: PeerId,
    pub addresses: Vec<String>,
}

/// A message as the pub/sub engine hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub source: Option<PeerId>,
    pub data: Vec<u8>,
    pub sequence_number: Option<u64>,
    pub topic: String,
    pub signature: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    pub id: String,
    pub propagation_source: PeerId,
}

#[async_trait]
pub trait NetworkFactory: Send + Sync {
    async fn build(&self, params: NetworkParams) -> Result<Arc<dyn Network>, NetworkError>;
}

#[async_trait]
pub trait Network: Send + Sync {
    fn local_id(&self) -> PeerId;

    /// Bring up the DHT client.
    async fn bootstrap(&self) -> Result<(), NetworkError>;

    /// One connection attempt to a multiaddress-style string.
    async fn dial(&self, address: &str) -> Result<(), NetworkError>;

    async fn advertise(&self, rendezvous: &str) -> Result<(), NetworkError>;

    /// Peers currently advertising `rendezvous`. May include ourselves.
    async fn find_peers(&self, rendezvous: &str) -> Result<Vec<DiscoveredPeer>, NetworkError>;

    async fn connect(&self, peer: &DiscoveredPeer) -> Result<(), NetworkError>;

    async fn join(
        &self,
        topic: &str,
    ) -> Result<(Arc<dyn PubsubTopic>, Box<dyn Subscription>), NetworkError>;

    /// Close the DHT client and the host. Outstanding subscriptions end.
    async fn close(&self) -> Result<(), NetworkError>;
}

#[async_trait]
pub trait PubsubTopic: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, data: Bytes) -> Result<(), NetworkError>;

    /// Remote peers we currently share this topic with.
    async fn list_peers(&self) -> Vec<PeerId>;

    /// Unsubscribe. The matching [`Subscription`] reports end of stream.
    async fn close(&self) -> Result<(), NetworkError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next message, or `None` once the subscription has ended.
    async fn next(&mut self) -> Result<Option<InboundMessage>, NetworkError>;
}
