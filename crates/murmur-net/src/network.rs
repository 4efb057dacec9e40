//! The libp2p network capability.
//!
//! Each [`Libp2pNetwork`] is one host: a swarm running TCP and QUIC with a
//! Kademlia DHT and gossipsub, driven by its own task. Handles talk to the
//! driver over a command channel, so every trait method is a request and a
//! oneshot reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use libp2p::identity::Keypair;
use libp2p::Multiaddr;
use murmur_core::PeerId;
use murmur_sessions::{
    DiscoveredPeer, InboundMessage, Network, NetworkError, NetworkFactory, NetworkParams,
    PubsubTopic, Subscription,
};
use tokio::sync::{mpsc, oneshot};

use crate::behaviour::{build_swarm, rendezvous_key};
use crate::driver::{to_peer_id, Command, Driver};

const COMMAND_QUEUE: usize = 64;

/// Builds one libp2p host per session.
#[derive(Debug, Clone, Default)]
pub struct Libp2pFactory;

#[async_trait]
impl NetworkFactory for Libp2pFactory {
    async fn build(&self, params: NetworkParams) -> Result<Arc<dyn Network>, NetworkError> {
        let network = Libp2pNetwork::start(params)?;
        Ok(Arc::new(network))
    }
}

pub struct Libp2pNetwork {
    local: PeerId,
    commands: mpsc::Sender<Command>,
    closed: AtomicBool,
}

impl Libp2pNetwork {
    /// Build the swarm, bind the listen address and spawn the driver.
    pub fn start(params: NetworkParams) -> Result<Self, NetworkError> {
        let listen: Multiaddr = params
            .listen_address
            .parse()
            .map_err(|e: libp2p::multiaddr::Error| {
                NetworkError::Address(params.listen_address.clone(), e.to_string())
            })?;

        let mut secret = params.identity.to_bytes();
        let keypair = Keypair::ed25519_from_bytes(secret.as_mut_slice())
            .map_err(|e| NetworkError::Init(e.to_string()))?;
        let local = keypair.public().to_peer_id();

        let mut swarm = build_swarm(keypair, params.pubsub_mode)?;
        swarm
            .listen_on(listen)
            .map_err(|e| NetworkError::Address(params.listen_address.clone(), e.to_string()))?;

        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        tokio::spawn(Driver::new(swarm, rx, params.verbose).run());

        tracing::info!(peer = %local, listen = %params.listen_address, "libp2p host started");
        Ok(Self {
            local: to_peer_id(&local),
            commands: tx,
            closed: AtomicBool::new(false),
        })
    }

    /// Addresses the host is currently listening on.
    pub async fn listen_addresses(&self) -> Result<Vec<String>, NetworkError> {
        request(&self.commands, |reply| Command::ListenAddresses { reply }).await
    }
}

async fn request<T>(
    commands: &mpsc::Sender<Command>,
    build: impl FnOnce(oneshot::Sender<Result<T, NetworkError>>) -> Command,
) -> Result<T, NetworkError> {
    let (reply, response) = oneshot::channel();
    commands
        .send(build(reply))
        .await
        .map_err(|_| NetworkError::Closed)?;
    response.await.map_err(|_| NetworkError::Closed)?
}

#[async_trait]
impl Network for Libp2pNetwork {
    fn local_id(&self) -> PeerId {
        self.local.clone()
    }

    async fn bootstrap(&self) -> Result<(), NetworkError> {
        request(&self.commands, |reply| Command::Bootstrap { reply }).await
    }

    async fn dial(&self, address: &str) -> Result<(), NetworkError> {
        let address: Multiaddr = address
            .parse()
            .map_err(|e: libp2p::multiaddr::Error| {
                NetworkError::Address(address.to_string(), e.to_string())
            })?;
        request(&self.commands, |reply| Command::Dial { address, reply }).await
    }

    async fn advertise(&self, rendezvous: &str) -> Result<(), NetworkError> {
        let key = rendezvous_key(rendezvous);
        request(&self.commands, |reply| Command::Advertise { key, reply }).await
    }

    async fn find_peers(&self, rendezvous: &str) -> Result<Vec<DiscoveredPeer>, NetworkError> {
        let key = rendezvous_key(rendezvous);
        request(&self.commands, |reply| Command::FindProviders { key, reply }).await
    }

    async fn connect(&self, peer: &DiscoveredPeer) -> Result<(), NetworkError> {
        let id: libp2p::PeerId = peer
            .id
            .as_str()
            .parse()
            .map_err(|e: libp2p::identity::ParseError| {
                NetworkError::Address(peer.id.to_string(), e.to_string())
            })?;
        let addresses = peer
            .addresses
            .iter()
            .filter_map(|a| a.parse::<Multiaddr>().ok())
            .collect();
        request(&self.commands, |reply| Command::Connect {
            peer: id,
            addresses,
            reply,
        })
        .await
    }

    async fn join(
        &self,
        topic: &str,
    ) -> Result<(Arc<dyn PubsubTopic>, Box<dyn Subscription>), NetworkError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let name = topic.to_string();
        request(&self.commands, |reply| Command::Subscribe {
            topic: name.clone(),
            sender,
            reply,
        })
        .await?;

        let topic = Libp2pTopic {
            name,
            commands: self.commands.clone(),
        };
        Ok((Arc::new(topic), Box::new(Libp2pSubscription { receiver })))
    }

    async fn close(&self) -> Result<(), NetworkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (done, stopped) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).await.is_ok() {
            let _ = stopped.await;
        }
        tracing::debug!(peer = %self.local, "libp2p host closed");
        Ok(())
    }
}

pub struct Libp2pTopic {
    name: String,
    commands: mpsc::Sender<Command>,
}

#[async_trait]
impl PubsubTopic for Libp2pTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, data: Bytes) -> Result<(), NetworkError> {
        let topic = self.name.clone();
        request(&self.commands, |reply| Command::Publish { topic, data, reply }).await
    }

    async fn list_peers(&self) -> Vec<PeerId> {
        let (reply, response) = oneshot::channel();
        let command = Command::TopicPeers {
            topic: self.name.clone(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    async fn close(&self) -> Result<(), NetworkError> {
        // A closed host has already dropped every subscription.
        let _ = self
            .commands
            .send(Command::Unsubscribe {
                topic: self.name.clone(),
            })
            .await;
        Ok(())
    }
}

pub struct Libp2pSubscription {
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
}

#[async_trait]
impl Subscription for Libp2pSubscription {
    async fn next(&mut self) -> Result<Option<InboundMessage>, NetworkError> {
        Ok(self.receiver.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use murmur_core::{Identity, PubsubMode};

    use super::*;

    fn params(listen: &str) -> NetworkParams {
        NetworkParams {
            listen_address: listen.to_string(),
            identity: Identity::generate(),
            pubsub_mode: PubsubMode::Gossip,
            verbose: false,
        }
    }

    async fn first_listen_address(network: &Libp2pNetwork) -> String {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let addresses = network.listen_addresses().await.unwrap();
                if let Some(address) = addresses.into_iter().next() {
                    return address;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("listener never came up")
    }

    #[tokio::test]
    async fn bad_listen_address_is_rejected() {
        let err = Libp2pNetwork::start(params("not an address")).err().unwrap();
        assert!(matches!(err, NetworkError::Address(..)));
    }

    #[tokio::test]
    async fn local_id_follows_the_identity() {
        let p = params("/ip4/127.0.0.1/tcp/0");
        let mut secret = p.identity.to_bytes();
        let expected = Keypair::ed25519_from_bytes(secret.as_mut_slice())
            .unwrap()
            .public()
            .to_peer_id()
            .to_base58();

        let network = Libp2pNetwork::start(p).unwrap();
        assert_eq!(network.local_id().as_str(), expected);
        network.close().await.unwrap();
    }

    #[tokio::test]
    async fn requests_after_close_fail() {
        let network = Libp2pNetwork::start(params("/ip4/127.0.0.1/tcp/0")).unwrap();
        network.close().await.unwrap();
        network.close().await.unwrap();
        assert!(matches!(
            network.bootstrap().await,
            Err(NetworkError::Closed)
        ));
    }

    #[tokio::test]
    async fn publish_without_peers_delivers_locally() {
        let network = Libp2pNetwork::start(params("/ip4/127.0.0.1/tcp/0")).unwrap();
        let (topic, mut subscription) = network.join("solo").await.unwrap();

        topic.publish(Bytes::from_static(b"echo")).await.unwrap();
        let message = subscription.next().await.unwrap().unwrap();
        assert_eq!(message.data, b"echo");
        assert_eq!(message.source, Some(network.local_id()));
        assert_eq!(message.topic, "solo");

        network.close().await.unwrap();
        assert_eq!(subscription.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn two_hosts_exchange_a_message_over_tcp() {
        let a = Libp2pNetwork::start(params("/ip4/127.0.0.1/tcp/0")).unwrap();
        let b = Libp2pNetwork::start(params("/ip4/127.0.0.1/tcp/0")).unwrap();

        let address = format!("{}/p2p/{}", first_listen_address(&a).await, a.local_id());
        b.dial(&address).await.unwrap();

        let (_topic_a, mut sub_a) = a.join("chat").await.unwrap();
        let (topic_b, _sub_b) = b.join("chat").await.unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while !topic_b.list_peers().await.contains(&a.local_id()) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("topic peers never converged");

        topic_b.publish(Bytes::from_static(b"hello")).await.unwrap();
        let message = tokio::time::timeout(Duration::from_secs(10), sub_a.next())
            .await
            .expect("message never arrived")
            .unwrap()
            .unwrap();
        assert_eq!(message.data, b"hello");
        assert_eq!(message.source, Some(b.local_id()));
        assert_eq!(message.propagation_source, b.local_id());
        assert!(message.signature.is_some());

        a.close().await.unwrap();
        b.close().await.unwrap();
    }
}
