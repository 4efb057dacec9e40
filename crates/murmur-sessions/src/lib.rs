//! murmur-sessions — multi-tenant p2p pub/sub session manager.
//!
//! A [`SessionRegistry`] owns any number of independent [`Session`]s. Each
//! session drives one network capability (see [`capability`]) through a
//! discovery loop, a peer tracking loop and one receive loop per joined
//! topic, and reports what happens to host callbacks via its
//! [`EventBridge`].

/// Log at `warn` when the session is verbose, `trace` otherwise.
macro_rules! verbose {
    ($shared:expr, $($arg:tt)+) => {
        if $shared.config.verbose {
            tracing::warn!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    };
}

pub mod bridge;
pub mod capability;
pub mod discovery;
pub mod error;
pub mod memory;
mod receiver;
pub mod registry;
pub mod session;
pub mod topics;
pub mod tracker;

pub use bridge::{Callback, EventBridge};
pub use capability::{
    DiscoveredPeer, InboundMessage, Network, NetworkError, NetworkFactory, NetworkParams,
    PubsubTopic, Subscription,
};
pub use discovery::DiscoveryState;
pub use error::SessionError;
pub use memory::{MemoryHub, MemoryNetwork};
pub use receiver::to_record;
pub use registry::{FatalReport, SessionRegistry};
pub use session::{Session, SessionConfig};
pub use topics::TopicInfo;
pub use tracker::{PeerDiff, PeerTracker};
