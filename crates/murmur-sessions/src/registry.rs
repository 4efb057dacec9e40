//! Session registry — allocates handles, owns live sessions, and is the
//! unit of shutdown.
//!
//! Slot indices are reused lowest-first once a session is destroyed. Each
//! reuse bumps the slot's generation, so a caller still holding the old
//! handle gets `UnknownSession` / `false` instead of reaching the new
//! session.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use murmur_core::{Event, EventKind, PeerId, SessionHandle, TopicHandle};
use tokio::sync::{mpsc, Mutex};

use crate::bridge::EventBridge;
use crate::capability::NetworkFactory;
use crate::error::SessionError;
use crate::session::{Session, SessionConfig};

/// A fatal condition raised by a session's background activity. The
/// receiver of these decides whether to destroy the session or stop the
/// process.
#[derive(Debug)]
pub struct FatalReport {
    pub session: SessionHandle,
    pub error: SessionError,
}

#[derive(Debug, Default)]
struct Slots {
    generations: Vec<u32>,
    free: BTreeSet<u32>,
}

impl Slots {
    fn acquire(&mut self) -> SessionHandle {
        match self.free.pop_first() {
            Some(index) => SessionHandle::new(index, self.generations[index as usize]),
            None => {
                self.generations.push(0);
                SessionHandle::new(self.generations.len() as u32 - 1, 0)
            }
        }
    }

    fn release(&mut self, handle: SessionHandle) {
        if let Some(generation) = self.generations.get_mut(handle.index as usize) {
            *generation = generation.wrapping_add(1);
            self.free.insert(handle.index);
        }
    }
}

struct Inner {
    factory: Arc<dyn NetworkFactory>,
    sessions: DashMap<u32, Session>,
    slots: Mutex<Slots>,
    fatal: mpsc::UnboundedSender<FatalReport>,
}

/// Cloneable handle over the registry state.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    /// A registry building sessions with `factory`, and the channel its
    /// sessions report fatal conditions on.
    pub fn new(factory: Arc<dyn NetworkFactory>) -> (Self, mpsc::UnboundedReceiver<FatalReport>) {
        let (fatal, fatal_rx) = mpsc::unbounded_channel();
        let registry = Self {
            inner: Arc::new(Inner {
                factory,
                sessions: DashMap::new(),
                slots: Mutex::new(Slots::default()),
                fatal,
            }),
        };
        (registry, fatal_rx)
    }

    pub async fn create(&self, config: SessionConfig) -> Result<SessionHandle, SessionError> {
        self.create_with_bridge(config, EventBridge::new()).await
    }

    /// Like [`create`](Self::create), with callbacks bound before the first
    /// event fires.
    pub async fn create_with_bridge(
        &self,
        config: SessionConfig,
        bridge: EventBridge,
    ) -> Result<SessionHandle, SessionError> {
        let handle = self.inner.slots.lock().await.acquire();
        let opened = Session::open(
            handle,
            config,
            self.inner.factory.as_ref(),
            bridge,
            self.inner.fatal.clone(),
        )
        .await;

        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session = %handle, error = %e, "session failed to open");
                self.inner.slots.lock().await.release(handle);
                return Err(e);
            }
        };

        self.inner.sessions.insert(handle.index, session.clone());
        if let Err(e) = session.start().await {
            tracing::warn!(session = %handle, error = %e, "session failed to start");
            // A fatal watcher may already have destroyed it.
            if self
                .inner
                .sessions
                .remove_if(&handle.index, |_, s| s.handle() == handle)
                .is_some()
            {
                session.close().await;
                self.inner.slots.lock().await.release(handle);
            }
            return Err(e);
        }
        Ok(handle)
    }

    /// Shut down and remove a session. `false` for unknown or stale handles.
    pub async fn destroy(&self, handle: SessionHandle) -> bool {
        let Some((_, session)) = self
            .inner
            .sessions
            .remove_if(&handle.index, |_, s| s.handle() == handle)
        else {
            return false;
        };
        session.shutdown().await;
        self.inner.slots.lock().await.release(handle);
        true
    }

    /// Destroy every live session.
    pub async fn shutdown_all(&self) {
        for handle in self.handles() {
            self.destroy(handle).await;
        }
    }

    pub fn get(&self, handle: SessionHandle) -> Result<Session, SessionError> {
        self.inner
            .sessions
            .get(&handle.index)
            .filter(|s| s.handle() == handle)
            .map(|s| s.value().clone())
            .ok_or(SessionError::UnknownSession(handle))
    }

    pub fn is_valid(&self, handle: SessionHandle) -> bool {
        self.get(handle).is_ok()
    }

    pub fn count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Live handles, lowest index first.
    pub fn handles(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> =
            self.inner.sessions.iter().map(|s| s.handle()).collect();
        handles.sort();
        handles
    }

    /// Bind `callback` for one event kind on one session, replacing any
    /// previous binding. `false` for unknown or stale handles.
    pub fn register<F>(&self, handle: SessionHandle, kind: EventKind, callback: F) -> bool
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        match self.get(handle) {
            Ok(session) => {
                session.bridge().register(kind, callback);
                true
            }
            Err(_) => false,
        }
    }

    // ── Per-session shortcuts ─────────────────────────────────────────────────

    pub fn local_id(&self, handle: SessionHandle) -> Option<PeerId> {
        self.get(handle).ok().map(|s| s.local_id())
    }

    pub async fn join(&self, handle: SessionHandle, name: &str) -> Result<TopicHandle, SessionError> {
        self.get(handle)?.join(name).await
    }

    pub async fn find(&self, handle: SessionHandle, name: &str) -> Option<TopicHandle> {
        self.get(handle).ok()?.find(name).await
    }

    pub async fn name(&self, handle: SessionHandle, topic: TopicHandle) -> Option<String> {
        self.get(handle).ok()?.name(topic).await
    }

    pub async fn leave(&self, handle: SessionHandle, topic: TopicHandle) -> bool {
        match self.get(handle) {
            Ok(session) => session.leave(topic).await,
            Err(_) => false,
        }
    }

    pub async fn publish(
        &self,
        handle: SessionHandle,
        topic: TopicHandle,
        data: impl Into<Bytes>,
    ) -> bool {
        match self.get(handle) {
            Ok(session) => session.publish(topic, data).await,
            Err(_) => false,
        }
    }
}
