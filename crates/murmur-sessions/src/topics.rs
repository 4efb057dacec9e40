//! Per-session topic registry.
//!
//! Append-only: the Nth join gets handle N. Leaving a topic tombstones its
//! slot instead of removing it, so a handle is never reassigned to another
//! name and a `Left` topic is never revived.

use std::sync::Arc;

use murmur_core::TopicHandle;
use tokio_util::sync::CancellationToken;

use crate::capability::PubsubTopic;

enum TopicState {
    Joined {
        topic: Arc<dyn PubsubTopic>,
        /// Stops this topic's receive loop.
        cancel: CancellationToken,
    },
    Left,
}

struct TopicSlot {
    name: String,
    state: TopicState,
}

/// Snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub handle: TopicHandle,
    pub name: String,
    pub joined: bool,
}

/// A topic that was joined and has just been tombstoned.
pub(crate) struct LeftTopic {
    pub handle: TopicHandle,
    pub topic: Arc<dyn PubsubTopic>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct TopicRegistry {
    slots: Vec<TopicSlot>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_joined(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Append a `Joined` slot. The caller has already checked that `name`
    /// is not joined.
    pub(crate) fn insert(
        &mut self,
        name: &str,
        topic: Arc<dyn PubsubTopic>,
        cancel: CancellationToken,
    ) -> TopicHandle {
        let handle = TopicHandle(self.slots.len() as u32);
        self.slots.push(TopicSlot {
            name: name.to_string(),
            state: TopicState::Joined { topic, cancel },
        });
        handle
    }

    /// First joined topic named `name`.
    pub fn find(&self, name: &str) -> Option<TopicHandle> {
        self.slots
            .iter()
            .position(|s| s.name == name && matches!(s.state, TopicState::Joined { .. }))
            .map(|i| TopicHandle(i as u32))
    }

    /// Name of a joined topic.
    pub fn name(&self, handle: TopicHandle) -> Option<&str> {
        match self.slot(handle) {
            Some(TopicSlot {
                name,
                state: TopicState::Joined { .. },
            }) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn topic(&self, handle: TopicHandle) -> Option<Arc<dyn PubsubTopic>> {
        match self.slot(handle) {
            Some(TopicSlot {
                state: TopicState::Joined { topic, .. },
                ..
            }) => Some(topic.clone()),
            _ => None,
        }
    }

    /// Pub/sub topics of every joined slot, in handle order.
    pub(crate) fn joined_topics(&self) -> Vec<Arc<dyn PubsubTopic>> {
        self.slots
            .iter()
            .filter_map(|s| match &s.state {
                TopicState::Joined { topic, .. } => Some(topic.clone()),
                TopicState::Left => None,
            })
            .collect()
    }

    /// Move a joined slot to `Left`. `None` for unknown or already-left
    /// handles.
    pub(crate) fn tombstone(&mut self, handle: TopicHandle) -> Option<LeftTopic> {
        let slot = self.slots.get_mut(handle.0 as usize)?;
        match std::mem::replace(&mut slot.state, TopicState::Left) {
            TopicState::Joined { topic, cancel } => Some(LeftTopic {
                handle,
                topic,
                cancel,
            }),
            TopicState::Left => None,
        }
    }

    /// Tombstone every joined slot, in handle order.
    pub(crate) fn tombstone_all(&mut self) -> Vec<LeftTopic> {
        (0..self.slots.len() as u32)
            .filter_map(|i| self.tombstone(TopicHandle(i)))
            .collect()
    }

    /// Every slot, tombstones included.
    pub fn list(&self) -> Vec<TopicInfo> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| TopicInfo {
                handle: TopicHandle(i as u32),
                name: s.name.clone(),
                joined: matches!(s.state, TopicState::Joined { .. }),
            })
            .collect()
    }

    fn slot(&self, handle: TopicHandle) -> Option<&TopicSlot> {
        self.slots.get(handle.0 as usize)
    }
}
