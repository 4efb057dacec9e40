//! murmur-core — identity, configuration, and the event types every other
//! murmur crate speaks.

pub mod config;
pub mod event;
pub mod identity;

pub use config::{FatalPolicy, MurmurConfig, PubsubMode};
pub use event::{Event, EventKind, MessageRecord, PeerId, SessionHandle, TopicHandle};
pub use identity::{Identity, IdentityError};
