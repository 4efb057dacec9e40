//! murmur-net — the libp2p network capability.
//!
//! One swarm per session: TCP and QUIC transports (noise + yamux over TCP),
//! DNS resolution for `/dnsaddr` bootstrap entries, Kademlia in server mode
//! for rendezvous provider records, and gossipsub for topics. The swarm is
//! owned by a driver task; [`Libp2pNetwork`] talks to it over a command
//! channel.

mod behaviour;
mod driver;
mod network;

pub use behaviour::rendezvous_key;
pub use network::{Libp2pFactory, Libp2pNetwork};
