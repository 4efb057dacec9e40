//! The swarm driver task. Owns the swarm, serves [`Command`]s, and routes
//! gossipsub messages to per-topic subscription channels.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, PublishError, TopicHash};
use libp2p::kad::{self, GetProvidersOk, QueryId, QueryResult};
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{ConnectionId, DialError, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm};
use murmur_sessions::{DiscoveredPeer, InboundMessage, NetworkError};
use tokio::sync::{mpsc, oneshot};

use crate::behaviour::{MurmurBehaviour, MurmurBehaviourEvent};

type Reply<T> = oneshot::Sender<Result<T, NetworkError>>;

pub(crate) enum Command {
    Bootstrap {
        reply: Reply<()>,
    },
    Dial {
        address: Multiaddr,
        reply: Reply<()>,
    },
    Advertise {
        key: kad::RecordKey,
        reply: Reply<()>,
    },
    FindProviders {
        key: kad::RecordKey,
        reply: Reply<Vec<DiscoveredPeer>>,
    },
    Connect {
        peer: PeerId,
        addresses: Vec<Multiaddr>,
        reply: Reply<()>,
    },
    Subscribe {
        topic: String,
        sender: mpsc::UnboundedSender<InboundMessage>,
        reply: Reply<()>,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        data: Bytes,
        reply: Reply<()>,
    },
    TopicPeers {
        topic: String,
        reply: oneshot::Sender<Vec<murmur_core::PeerId>>,
    },
    ListenAddresses {
        reply: Reply<Vec<String>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

struct ProviderQuery {
    reply: Reply<Vec<DiscoveredPeer>>,
    found: HashSet<PeerId>,
}

pub(crate) struct Driver {
    swarm: Swarm<MurmurBehaviour>,
    commands: mpsc::Receiver<Command>,
    verbose: bool,
    subscriptions: HashMap<TopicHash, mpsc::UnboundedSender<InboundMessage>>,
    pending_dials: HashMap<ConnectionId, Reply<()>>,
    pending_providers: HashMap<QueryId, ProviderQuery>,
}

pub(crate) fn to_peer_id(peer: &PeerId) -> murmur_core::PeerId {
    murmur_core::PeerId::new(peer.to_base58())
}

impl Driver {
    pub(crate) fn new(
        swarm: Swarm<MurmurBehaviour>,
        commands: mpsc::Receiver<Command>,
        verbose: bool,
    ) -> Self {
        Self {
            swarm,
            commands,
            verbose,
            subscriptions: HashMap::new(),
            pending_dials: HashMap::new(),
            pending_providers: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        let local = *self.swarm.local_peer_id();
        tracing::debug!(peer = %local, "swarm driver started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { done }) => {
                        self.fail_pending();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    // Every handle dropped.
                    None => break,
                },
                event = self.swarm.select_next_some() => self.handle_event(event),
            }
        }
        tracing::debug!(peer = %local, "swarm driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Bootstrap { reply } => {
                // An empty routing table is expected before the bootstrap
                // dials land.
                match self.swarm.behaviour_mut().kademlia.bootstrap() {
                    Ok(_) | Err(kad::NoKnownPeers()) => {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
            Command::Dial { address, reply } => {
                let opts = match peer_of(&address) {
                    Some(peer) => {
                        self.swarm
                            .behaviour_mut()
                            .kademlia
                            .add_address(&peer, address.clone());
                        DialOpts::peer_id(peer).addresses(vec![address]).build()
                    }
                    None => DialOpts::unknown_peer_id().address(address).build(),
                };
                self.dial(opts, reply);
            }
            Command::Advertise { key, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .start_providing(key)
                    .map(|_| ())
                    .map_err(|e| NetworkError::Dht(e.to_string()));
                let _ = reply.send(result);
            }
            Command::FindProviders { key, reply } => {
                let id = self.swarm.behaviour_mut().kademlia.get_providers(key);
                self.pending_providers.insert(
                    id,
                    ProviderQuery {
                        reply,
                        found: HashSet::new(),
                    },
                );
            }
            Command::Connect {
                peer,
                addresses,
                reply,
            } => {
                let opts = DialOpts::peer_id(peer).addresses(addresses).build();
                self.dial(opts, reply);
            }
            Command::Subscribe {
                topic,
                sender,
                reply,
            } => {
                let ident = IdentTopic::new(topic);
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .subscribe(&ident)
                    .map(|_| ())
                    .map_err(|e| NetworkError::Pubsub(e.to_string()));
                if result.is_ok() {
                    self.subscriptions.insert(ident.hash(), sender);
                }
                let _ = reply.send(result);
            }
            Command::Unsubscribe { topic } => {
                let ident = IdentTopic::new(topic);
                let _ = self.swarm.behaviour_mut().gossipsub.unsubscribe(&ident);
                self.subscriptions.remove(&ident.hash());
            }
            Command::Publish { topic, data, reply } => {
                let _ = reply.send(self.publish(topic, data));
            }
            Command::TopicPeers { topic, reply } => {
                let hash = IdentTopic::new(topic).hash();
                let peers = self
                    .swarm
                    .behaviour()
                    .gossipsub
                    .all_peers()
                    .filter(|(_, topics)| topics.contains(&&hash))
                    .map(|(peer, _)| to_peer_id(peer))
                    .collect();
                let _ = reply.send(peers);
            }
            Command::ListenAddresses { reply } => {
                let addresses = self.swarm.listeners().map(|a| a.to_string()).collect();
                let _ = reply.send(Ok(addresses));
            }
            Command::Shutdown { done } => {
                // run() intercepts shutdown before dispatching here.
                let _ = done.send(());
            }
        }
    }

    fn dial(&mut self, opts: DialOpts, reply: Reply<()>) {
        let id = opts.connection_id();
        match self.swarm.dial(opts) {
            Ok(()) => {
                self.pending_dials.insert(id, reply);
            }
            // Already connected.
            Err(DialError::DialPeerConditionFalse(_)) => {
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let _ = reply.send(Err(NetworkError::Dial(e.to_string())));
            }
        }
    }

    /// Publish, then loop the message back to our own subscription the way
    /// a subscriber on the same host would see it.
    fn publish(&mut self, topic: String, data: Bytes) -> Result<(), NetworkError> {
        let ident = IdentTopic::new(topic.clone());
        let hash = ident.hash();
        let id = match self
            .swarm
            .behaviour_mut()
            .gossipsub
            .publish(ident, data.to_vec())
        {
            Ok(id) => id.to_string(),
            // Nobody else is listening yet; local delivery still happens.
            Err(PublishError::InsufficientPeers) => String::new(),
            Err(e) => return Err(NetworkError::Pubsub(e.to_string())),
        };

        if let Some(sender) = self.subscriptions.get(&hash) {
            let local = to_peer_id(self.swarm.local_peer_id());
            let _ = sender.send(InboundMessage {
                source: Some(local.clone()),
                data: data.to_vec(),
                sequence_number: None,
                topic,
                signature: None,
                key: None,
                id,
                propagation_source: local,
            });
        }
        Ok(())
    }

    fn handle_event(&mut self, event: SwarmEvent<MurmurBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(address = %address, "listening");
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                ..
            } => {
                self.swarm
                    .behaviour_mut()
                    .kademlia
                    .add_address(&peer_id, endpoint.get_remote_address().clone());
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(()));
                }
                tracing::trace!(peer = %peer_id, "connection established");
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                error,
                ..
            } => {
                if self.verbose {
                    tracing::warn!(error = %error, "outgoing connection failed");
                }
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(NetworkError::Dial(error.to_string())));
                }
            }
            SwarmEvent::Behaviour(MurmurBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message_id,
                message,
            })) => {
                let Some(sender) = self.subscriptions.get(&message.topic) else {
                    return;
                };
                let _ = sender.send(InboundMessage {
                    source: message.source.as_ref().map(to_peer_id),
                    data: message.data,
                    sequence_number: message.sequence_number,
                    topic: message.topic.to_string(),
                    signature: message.signature,
                    key: message.key,
                    id: message_id.to_string(),
                    propagation_source: to_peer_id(&propagation_source),
                });
            }
            SwarmEvent::Behaviour(MurmurBehaviourEvent::Kademlia(
                kad::Event::OutboundQueryProgressed {
                    id, result, step, ..
                },
            )) => self.handle_query(id, result, step.last),
            _ => {}
        }
    }

    fn handle_query(&mut self, id: QueryId, result: QueryResult, last: bool) {
        match result {
            QueryResult::GetProviders(Ok(GetProvidersOk::FoundProviders { providers, .. })) => {
                if let Some(query) = self.pending_providers.get_mut(&id) {
                    query.found.extend(providers);
                }
            }
            QueryResult::GetProviders(Ok(GetProvidersOk::FinishedWithNoAdditionalRecord {
                ..
            })) => {}
            // Timeouts still carry whatever was found.
            QueryResult::GetProviders(Err(kad::GetProvidersError::Timeout { .. })) => {}
            QueryResult::StartProviding(Err(e)) => {
                if self.verbose {
                    tracing::warn!(error = %e, "provider record not replicated");
                }
                return;
            }
            QueryResult::Bootstrap(Err(e)) => {
                if self.verbose {
                    tracing::warn!(error = %e, "dht bootstrap query failed");
                }
                return;
            }
            _ => return,
        }

        if last {
            if let Some(query) = self.pending_providers.remove(&id) {
                let peers = query
                    .found
                    .iter()
                    .map(|peer| DiscoveredPeer {
                        id: to_peer_id(peer),
                        addresses: Vec::new(),
                    })
                    .collect();
                let _ = query.reply.send(Ok(peers));
            }
        }
    }

    fn fail_pending(&mut self) {
        for (_, reply) in self.pending_dials.drain() {
            let _ = reply.send(Err(NetworkError::Closed));
        }
        for (_, query) in self.pending_providers.drain() {
            let _ = query.reply.send(Err(NetworkError::Closed));
        }
        // Dropping the senders ends every subscription.
        self.subscriptions.clear();
    }
}

/// Peer id carried in a trailing `/p2p/` component.
pub(crate) fn peer_of(address: &Multiaddr) -> Option<PeerId> {
    address.iter().find_map(|p| match p {
        Protocol::P2p(peer) => Some(peer),
        _ => None,
    })
}
