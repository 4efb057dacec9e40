//! Swarm construction.

use std::time::Duration;

use libp2p::gossipsub::{self, MessageAuthenticity, ValidationMode};
use libp2p::identity::Keypair;
use libp2p::kad::{self, store::MemoryStore};
use libp2p::swarm::NetworkBehaviour;
use libp2p::{noise, tcp, yamux, Swarm, SwarmBuilder};
use murmur_core::PubsubMode;
use murmur_sessions::NetworkError;
use sha2::{Digest, Sha256};

const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(NetworkBehaviour)]
pub(crate) struct MurmurBehaviour {
    pub kademlia: kad::Behaviour<MemoryStore>,
    pub gossipsub: gossipsub::Behaviour,
}

fn init_error(e: impl std::fmt::Display) -> NetworkError {
    NetworkError::Init(e.to_string())
}

pub(crate) fn build_swarm(
    keypair: Keypair,
    mode: PubsubMode,
) -> Result<Swarm<MurmurBehaviour>, NetworkError> {
    let peer_id = keypair.public().to_peer_id();

    let mut kademlia = kad::Behaviour::new(peer_id, MemoryStore::new(peer_id));
    kademlia.set_mode(Some(kad::Mode::Server));

    let config = gossipsub::ConfigBuilder::default()
        .validation_mode(ValidationMode::Strict)
        .flood_publish(mode == PubsubMode::Flood)
        .build()
        .map_err(init_error)?;
    let gossipsub = gossipsub::Behaviour::new(MessageAuthenticity::Signed(keypair.clone()), config)
        .map_err(init_error)?;

    let behaviour = MurmurBehaviour {
        kademlia,
        gossipsub,
    };

    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(init_error)?
        .with_quic()
        .with_dns()
        .map_err(init_error)?
        .with_behaviour(|_| behaviour)
        .map_err(init_error)?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
        .build();
    Ok(swarm)
}

/// DHT key for a rendezvous string: the sha2-256 multihash of its bytes,
/// the same key go-libp2p's routing discovery provides under.
pub fn rendezvous_key(rendezvous: &str) -> kad::RecordKey {
    let digest = Sha256::digest(rendezvous.as_bytes());
    let mut multihash = Vec::with_capacity(2 + digest.len());
    multihash.extend_from_slice(&[0x12, 0x20]);
    multihash.extend_from_slice(&digest);
    kad::RecordKey::new(&multihash)
}
