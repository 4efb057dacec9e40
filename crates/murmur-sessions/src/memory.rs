//! In-process network — every [`MemoryNetwork`] built from one
//! [`MemoryHub`] can see the others.
//!
//! The hub keeps an address book, rendezvous sets, symmetric links between
//! nodes, and per-topic subscriber lists. Publishing delivers to the
//! publisher's own subscription and to every linked subscriber, each
//! message signed with the publisher's identity. A publish or a topic peer
//! listing only reaches peers the publisher is linked to, as a real
//! pub/sub engine only reaches connected peers.
//!
//! Failure injection: [`MemoryHub::fail_publishes`], [`MemoryHub::set_dht_down`],
//! [`MemoryHub::sever`], [`MemoryHub::break_subscription`].

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use murmur_core::{Identity, PeerId};
use tokio::sync::{mpsc, Mutex};

use crate::capability::{
    DiscoveredPeer, InboundMessage, Network, NetworkError, NetworkFactory, NetworkParams,
    PubsubTopic, Subscription,
};

type Delivery = Result<InboundMessage, NetworkError>;

struct Subscriber {
    id: u64,
    peer: PeerId,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct HubState {
    /// listen address → node
    addresses: HashMap<String, PeerId>,
    /// node → listen address
    nodes: HashMap<PeerId, String>,
    rendezvous: HashMap<String, BTreeSet<PeerId>>,
    links: BTreeSet<(PeerId, PeerId)>,
    severed: BTreeSet<(PeerId, PeerId)>,
    subscriptions: HashMap<String, Vec<Subscriber>>,
    next_subscription: u64,
    fail_publishes: bool,
    dht_down: bool,
}

fn pair(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl HubState {
    fn linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.links.contains(&pair(a, b))
    }

    fn link(&mut self, a: &PeerId, b: &PeerId) -> Result<(), NetworkError> {
        if a == b {
            return Err(NetworkError::Dial("cannot dial self".into()));
        }
        if !self.nodes.contains_key(b) {
            return Err(NetworkError::Dial(format!("peer {b} is not reachable")));
        }
        if self.severed.contains(&pair(a, b)) {
            return Err(NetworkError::Dial(format!("link to {b} is severed")));
        }
        self.links.insert(pair(a, b));
        Ok(())
    }

    fn remove_node(&mut self, id: &PeerId) {
        if let Some(address) = self.nodes.remove(id) {
            self.addresses.remove(&address);
        }
        for members in self.rendezvous.values_mut() {
            members.remove(id);
        }
        self.links.retain(|(a, b)| a != id && b != id);
        for subscribers in self.subscriptions.values_mut() {
            subscribers.retain(|s| &s.peer != id);
        }
    }
}

/// The shared "internet". Cloning shares it.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail until switched off.
    pub async fn fail_publishes(&self, fail: bool) {
        self.state.lock().await.fail_publishes = fail;
    }

    /// Make DHT bootstrap fail for every node.
    pub async fn set_dht_down(&self, down: bool) {
        self.state.lock().await.dht_down = down;
    }

    /// Drop the link between two nodes and refuse to re-establish it.
    pub async fn sever(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.state.lock().await;
        state.links.remove(&pair(a, b));
        state.severed.insert(pair(a, b));
    }

    /// Push a receive error into every subscription `peer` holds on `topic`.
    pub async fn break_subscription(&self, peer: &PeerId, topic: &str) {
        let state = self.state.lock().await;
        if let Some(subscribers) = state.subscriptions.get(topic) {
            for s in subscribers.iter().filter(|s| &s.peer == peer) {
                let _ = s
                    .tx
                    .send(Err(NetworkError::Pubsub("subscription broken".into())));
            }
        }
    }

    pub async fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.state.lock().await.linked(a, b)
    }

    pub async fn node_count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    /// Number of live subscriptions on `topic`, across all nodes.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .await
            .subscriptions
            .get(topic)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl NetworkFactory for MemoryHub {
    async fn build(&self, params: NetworkParams) -> Result<Arc<dyn Network>, NetworkError> {
        if params.listen_address.is_empty() {
            return Err(NetworkError::Init("empty listen address".into()));
        }
        let id = params.identity.peer_id();

        let mut state = self.state.lock().await;
        if state.addresses.contains_key(&params.listen_address) {
            return Err(NetworkError::Init(format!(
                "address {} already in use",
                params.listen_address
            )));
        }
        if state.nodes.contains_key(&id) {
            return Err(NetworkError::Init(format!("identity {id} already online")));
        }
        state
            .addresses
            .insert(params.listen_address.clone(), id.clone());
        state.nodes.insert(id.clone(), params.listen_address.clone());

        Ok(Arc::new(MemoryNetwork {
            node: Arc::new(Node {
                id,
                identity: params.identity,
                hub: self.clone(),
                seqno: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }))
    }
}

struct Node {
    id: PeerId,
    identity: Identity,
    hub: MemoryHub,
    seqno: AtomicU64,
    closed: AtomicBool,
}

impl Node {
    fn check_open(&self) -> Result<(), NetworkError> {
        if self.closed.load(Ordering::Acquire) {
            Err(NetworkError::Closed)
        } else {
            Ok(())
        }
    }

    /// Build a signed record for `data` on `topic`.
    fn seal(&self, topic: &str, data: &[u8]) -> InboundMessage {
        let seqno = self.seqno.fetch_add(1, Ordering::Relaxed);

        let mut signed = Vec::with_capacity(topic.len() + 8 + data.len());
        signed.extend_from_slice(topic.as_bytes());
        signed.extend_from_slice(&seqno.to_be_bytes());
        signed.extend_from_slice(data);

        let mut id = blake3::Hasher::new();
        id.update(self.id.as_str().as_bytes());
        id.update(&seqno.to_be_bytes());

        InboundMessage {
            source: Some(self.id.clone()),
            data: data.to_vec(),
            sequence_number: Some(seqno),
            topic: topic.to_string(),
            signature: Some(self.identity.sign(&signed).to_vec()),
            key: Some(self.identity.public_key().to_vec()),
            id: hex::encode(&id.finalize().as_bytes()[..16]),
            propagation_source: self.id.clone(),
        }
    }
}

/// One node on a [`MemoryHub`].
pub struct MemoryNetwork {
    node: Arc<Node>,
}

#[async_trait]
impl Network for MemoryNetwork {
    fn local_id(&self) -> PeerId {
        self.node.id.clone()
    }

    async fn bootstrap(&self) -> Result<(), NetworkError> {
        self.node.check_open()?;
        if self.node.hub.state.lock().await.dht_down {
            return Err(NetworkError::Dht("no bootstrap nodes reachable".into()));
        }
        Ok(())
    }

    async fn dial(&self, address: &str) -> Result<(), NetworkError> {
        self.node.check_open()?;
        let mut state = self.node.hub.state.lock().await;
        let target = state
            .addresses
            .get(address)
            .cloned()
            .ok_or_else(|| NetworkError::Dial(format!("no route to {address}")))?;
        state.link(&self.node.id, &target)
    }

    async fn advertise(&self, rendezvous: &str) -> Result<(), NetworkError> {
        self.node.check_open()?;
        let mut state = self.node.hub.state.lock().await;
        if state.dht_down {
            return Err(NetworkError::Dht("provider record rejected".into()));
        }
        state
            .rendezvous
            .entry(rendezvous.to_string())
            .or_default()
            .insert(self.node.id.clone());
        Ok(())
    }

    async fn find_peers(&self, rendezvous: &str) -> Result<Vec<DiscoveredPeer>, NetworkError> {
        self.node.check_open()?;
        let state = self.node.hub.state.lock().await;
        let Some(members) = state.rendezvous.get(rendezvous) else {
            return Ok(Vec::new());
        };
        Ok(members
            .iter()
            .map(|id| DiscoveredPeer {
                id: id.clone(),
                addresses: state.nodes.get(id).cloned().into_iter().collect(),
            })
            .collect())
    }

    async fn connect(&self, peer: &DiscoveredPeer) -> Result<(), NetworkError> {
        self.node.check_open()?;
        self.node
            .hub
            .state
            .lock()
            .await
            .link(&self.node.id, &peer.id)
    }

    async fn join(
        &self,
        topic: &str,
    ) -> Result<(Arc<dyn PubsubTopic>, Box<dyn Subscription>), NetworkError> {
        self.node.check_open()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.node.hub.state.lock().await;
        let id = state.next_subscription;
        state.next_subscription += 1;
        state
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                id,
                peer: self.node.id.clone(),
                tx,
            });

        let handle = MemoryTopic {
            node: self.node.clone(),
            name: topic.to_string(),
            subscription: id,
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(handle), Box::new(MemorySubscription { rx })))
    }

    async fn close(&self) -> Result<(), NetworkError> {
        if self.node.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.node.hub.state.lock().await.remove_node(&self.node.id);
        Ok(())
    }
}

struct MemoryTopic {
    node: Arc<Node>,
    name: String,
    subscription: u64,
    closed: AtomicBool,
}

#[async_trait]
impl PubsubTopic for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, data: Bytes) -> Result<(), NetworkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetworkError::Pubsub("topic closed".into()));
        }
        self.node.check_open()?;

        let state = self.node.hub.state.lock().await;
        if state.fail_publishes {
            return Err(NetworkError::Pubsub("publish rejected".into()));
        }
        let message = self.node.seal(&self.name, &data);
        let Some(subscribers) = state.subscriptions.get(&self.name) else {
            return Ok(());
        };
        for s in subscribers {
            if s.peer == self.node.id || state.linked(&s.peer, &self.node.id) {
                let _ = s.tx.send(Ok(message.clone()));
            }
        }
        Ok(())
    }

    async fn list_peers(&self) -> Vec<PeerId> {
        let state = self.node.hub.state.lock().await;
        let Some(subscribers) = state.subscriptions.get(&self.name) else {
            return Vec::new();
        };
        let peers: BTreeSet<PeerId> = subscribers
            .iter()
            .filter(|s| s.peer != self.node.id && state.linked(&s.peer, &self.node.id))
            .map(|s| s.peer.clone())
            .collect();
        peers.into_iter().collect()
    }

    async fn close(&self) -> Result<(), NetworkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.node.hub.state.lock().await;
        if let Some(subscribers) = state.subscriptions.get_mut(&self.name) {
            subscribers.retain(|s| s.id != self.subscription);
        }
        Ok(())
    }
}

struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<InboundMessage>, NetworkError> {
        self.rx.recv().await.transpose()
    }
}
