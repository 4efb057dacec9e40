//! Session-level errors.
//!
//! Every variant except `UnknownSession`, `AlreadyJoined` and `Closed` is
//! fatal: the session cannot do its job. Synchronous calls return them,
//! background activities send them to the registry owner as a
//! [`FatalReport`](crate::registry::FatalReport).

use std::time::Duration;

use murmur_core::{EventKind, IdentityError, SessionHandle};
use thiserror::Error;

use crate::capability::NetworkError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown or stale session handle {0}")]
    UnknownSession(SessionHandle),
    #[error("topic {0:?} is already joined")]
    AlreadyJoined(String),
    #[error("session is shutting down")]
    Closed,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("failed to construct network: {0}")]
    Network(#[source] NetworkError),
    #[error("dht bootstrap failed: {0}")]
    Bootstrap(#[source] NetworkError),
    #[error("failed to advertise under {rendezvous:?}: {source}")]
    Advertise {
        rendezvous: String,
        #[source]
        source: NetworkError,
    },
    #[error("peer query failed: {0}")]
    PeerQuery(#[source] NetworkError),
    #[error("failed to find peers within {0:?}")]
    DiscoveryTimeout(Duration),
    #[error("failed to join topic {topic:?}: {source}")]
    Join {
        topic: String,
        #[source]
        source: NetworkError,
    },
    #[error("receive failed on topic {topic:?}: {source}")]
    Receive {
        topic: String,
        #[source]
        source: NetworkError,
    },
    #[error("host rejected {0:?} event")]
    DispatchRejected(EventKind),
}

impl SessionError {
    /// Soft errors describe a caller mistake; everything else means the
    /// session can no longer do its job.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::UnknownSession(_) | SessionError::AlreadyJoined(_) | SessionError::Closed
        )
    }
}
