//! Handles, peer ids, and the canonical event records delivered to hosts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Handles ───────────────────────────────────────────────────────────────────

/// Identifies a live session in a `SessionRegistry`.
///
/// `index` is a small slot number that may be reused once its session is
/// destroyed. `generation` is bumped on every reuse so a caller still holding
/// the old handle is rejected instead of being redirected to the new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionHandle {
    pub index: u32,
    pub generation: u32,
}

impl SessionHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Pack into one integer for hosts that can only carry a number.
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

impl FromStr for SessionHandle {
    type Err = String;

    /// Accepts `index.generation`, or a bare index meaning generation 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, generation) = match s.split_once('.') {
            Some((i, g)) => (i, g),
            None => (s, "0"),
        };
        let index = index
            .parse()
            .map_err(|_| format!("invalid session index in {s:?}"))?;
        let generation = generation
            .parse()
            .map_err(|_| format!("invalid session generation in {s:?}"))?;
        Ok(Self { index, generation })
    }
}

/// Identifies a topic within one session. Allocated 0, 1, 2, … in join order
/// and never reassigned, even after the topic is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicHandle(pub u32);

impl fmt::Display for TopicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Textual peer identifier as rendered by the network capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// A pub/sub message as handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Original author. Absent when the pub/sub engine runs unsigned.
    pub from: Option<PeerId>,
    pub data: Vec<u8>,
    /// Big-endian sequence number bytes; empty when the engine sends none.
    pub seqno: Vec<u8>,
    pub topic: String,
    pub signature: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    pub id: String,
    /// The peer that relayed this message to us (ourselves for local
    /// publishes).
    pub received_from: PeerId,
}

impl MessageRecord {
    /// True when the message was published by `local`.
    pub fn is_local(&self, local: &PeerId) -> bool {
        &self.received_from == local
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// One registration slot per kind on each session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageReceived,
    PeerConnected,
    PeerDisconnected,
    TopicJoined,
    TopicLeft,
    DiscoveryCompleted,
    SessionClosed,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::MessageReceived,
        EventKind::PeerConnected,
        EventKind::PeerDisconnected,
        EventKind::TopicJoined,
        EventKind::TopicLeft,
        EventKind::DiscoveryCompleted,
        EventKind::SessionClosed,
    ];
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message_received" => Ok(Self::MessageReceived),
            "peer_connected" => Ok(Self::PeerConnected),
            "peer_disconnected" => Ok(Self::PeerDisconnected),
            "topic_joined" => Ok(Self::TopicJoined),
            "topic_left" => Ok(Self::TopicLeft),
            "discovery_completed" => Ok(Self::DiscoveryCompleted),
            "session_closed" => Ok(Self::SessionClosed),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Everything a session reports to its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MessageReceived {
        session: SessionHandle,
        message: MessageRecord,
    },
    PeerConnected {
        session: SessionHandle,
        peer: PeerId,
    },
    PeerDisconnected {
        session: SessionHandle,
        peer: PeerId,
    },
    TopicJoined {
        session: SessionHandle,
        topic: TopicHandle,
    },
    TopicLeft {
        session: SessionHandle,
        topic: TopicHandle,
    },
    DiscoveryCompleted {
        session: SessionHandle,
    },
    SessionClosed {
        session: SessionHandle,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageReceived { .. } => EventKind::MessageReceived,
            Event::PeerConnected { .. } => EventKind::PeerConnected,
            Event::PeerDisconnected { .. } => EventKind::PeerDisconnected,
            Event::TopicJoined { .. } => EventKind::TopicJoined,
            Event::TopicLeft { .. } => EventKind::TopicLeft,
            Event::DiscoveryCompleted { .. } => EventKind::DiscoveryCompleted,
            Event::SessionClosed { .. } => EventKind::SessionClosed,
        }
    }

    pub fn session(&self) -> SessionHandle {
        match self {
            Event::MessageReceived { session, .. }
            | Event::PeerConnected { session, .. }
            | Event::PeerDisconnected { session, .. }
            | Event::TopicJoined { session, .. }
            | Event::TopicLeft { session, .. }
            | Event::DiscoveryCompleted { session }
            | Event::SessionClosed { session } => *session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_handle_packs_generation_high() {
        let h = SessionHandle::new(3, 7);
        assert_eq!(h.to_raw(), (7u64 << 32) | 3);
        assert_eq!(SessionHandle::from_raw(h.to_raw()), h);
    }

    #[test]
    fn handle_parses_with_and_without_generation() {
        assert_eq!("4.2".parse::<SessionHandle>().unwrap(), SessionHandle::new(4, 2));
        assert_eq!("4".parse::<SessionHandle>().unwrap(), SessionHandle::new(4, 0));
        assert!("x.1".parse::<SessionHandle>().is_err());
        assert_eq!(SessionHandle::new(4, 2).to_string(), "4.2");
    }

    #[test]
    fn event_kind_matches_variant() {
        let session = SessionHandle::new(0, 0);
        let e = Event::TopicLeft {
            session,
            topic: TopicHandle(2),
        };
        assert_eq!(e.kind(), EventKind::TopicLeft);
        assert_eq!(e.session(), session);
    }

    #[test]
    fn event_kind_names_roundtrip_through_from_str() {
        for kind in EventKind::ALL {
            let name = serde_plain_name(kind);
            assert_eq!(name.parse::<EventKind>().unwrap(), kind);
        }
    }

    fn serde_plain_name(kind: EventKind) -> String {
        let v = toml::Value::try_from(kind).unwrap();
        v.as_str().unwrap().to_string()
    }

    #[test]
    fn local_messages_are_recognised() {
        let me = PeerId::from("me");
        let record = MessageRecord {
            from: Some(me.clone()),
            data: b"hi".to_vec(),
            seqno: vec![0, 0, 0, 0, 0, 0, 0, 1],
            topic: "t".into(),
            signature: None,
            key: None,
            id: "abc".into(),
            received_from: me.clone(),
        };
        assert!(record.is_local(&me));
        assert!(!record.is_local(&PeerId::from("other")));
    }
}
