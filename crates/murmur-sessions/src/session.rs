//! One p2p session: an identity, a network capability, a topic registry,
//! and the background activities driving them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use murmur_core::config::{secs_to_duration, NetworkConfig, SessionDefaults};
use murmur_core::{Event, Identity, PeerId, PubsubMode, SessionHandle, TopicHandle};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use zeroize::Zeroizing;

use crate::bridge::EventBridge;
use crate::capability::{Network, NetworkFactory, NetworkParams};
use crate::discovery::{self, DiscoveryState};
use crate::error::SessionError;
use crate::receiver;
use crate::registry::FatalReport;
use crate::topics::{LeftTopic, TopicInfo, TopicRegistry};
use crate::tracker::{self, PeerTracker};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Everything needed to open a session.
#[derive(Clone)]
pub struct SessionConfig {
    pub listen_address: String,
    pub rendezvous_topic: String,
    /// 32-byte secret or 64-byte keypair. Empty generates a fresh identity.
    pub key_material: Zeroizing<Vec<u8>>,
    pub connection_timeout: Duration,
    pub pubsub_mode: PubsubMode,
    pub verbose: bool,
    pub peer_poll_interval: Duration,
    pub search_backoff: Duration,
    pub bootstrap_peers: Vec<String>,
}

impl SessionConfig {
    /// A session on `listen_address` meeting peers under `rendezvous_topic`,
    /// with every other field at its default.
    pub fn new(listen_address: impl Into<String>, rendezvous_topic: impl Into<String>) -> Self {
        let defaults = SessionDefaults::default();
        Self {
            listen_address: listen_address.into(),
            rendezvous_topic: rendezvous_topic.into(),
            key_material: Zeroizing::new(Vec::new()),
            connection_timeout: defaults.connection_timeout(),
            pubsub_mode: defaults.pubsub_mode,
            verbose: defaults.verbose,
            peer_poll_interval: defaults.peer_poll_interval(),
            search_backoff: defaults.search_backoff(),
            bootstrap_peers: NetworkConfig::default().bootstrap_peers,
        }
    }

    pub fn from_defaults(defaults: &SessionDefaults, network: &NetworkConfig) -> Self {
        Self {
            listen_address: defaults.listen_address.clone(),
            rendezvous_topic: defaults.rendezvous_topic.clone(),
            key_material: Zeroizing::new(Vec::new()),
            connection_timeout: defaults.connection_timeout(),
            pubsub_mode: defaults.pubsub_mode,
            verbose: defaults.verbose,
            peer_poll_interval: defaults.peer_poll_interval(),
            search_backoff: defaults.search_backoff(),
            bootstrap_peers: network.bootstrap_peers.clone(),
        }
    }

    pub fn with_key(mut self, key: &[u8]) -> Self {
        self.key_material = Zeroizing::new(key.to_vec());
        self
    }

    pub fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.connection_timeout = secs_to_duration(secs);
        self
    }

    pub fn with_pubsub_mode(mut self, mode: PubsubMode) -> Self {
        self.pubsub_mode = mode;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_peer_poll_interval(mut self, interval: Duration) -> Self {
        self.peer_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_search_backoff(mut self, backoff: Duration) -> Self {
        self.search_backoff = backoff;
        self
    }

    pub fn with_bootstrap_peers(mut self, peers: Vec<String>) -> Self {
        self.bootstrap_peers = peers;
        self
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("listen_address", &self.listen_address)
            .field("rendezvous_topic", &self.rendezvous_topic)
            .field("key_material", &format_args!("<{} bytes>", self.key_material.len()))
            .field("connection_timeout", &self.connection_timeout)
            .field("pubsub_mode", &self.pubsub_mode)
            .field("verbose", &self.verbose)
            .field("peer_poll_interval", &self.peer_poll_interval)
            .field("search_backoff", &self.search_backoff)
            .field("bootstrap_peers", &self.bootstrap_peers.len())
            .finish()
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// State shared by a session and its background activities.
pub(crate) struct Shared {
    pub handle: SessionHandle,
    /// Key material is cleared once the identity is built.
    pub config: SessionConfig,
    pub network: Arc<dyn Network>,
    pub topics: Mutex<TopicRegistry>,
    pub peers: Mutex<PeerTracker>,
    pub bridge: EventBridge,
    pub cancel: CancellationToken,
    pub tasks: TaskTracker,
    pub discovery: watch::Sender<DiscoveryState>,
    pub fatal: mpsc::UnboundedSender<FatalReport>,
}

impl Shared {
    /// Hand `event` to the host. A rejection is fatal and reported here;
    /// callers only need to stop.
    pub(crate) fn dispatch(&self, event: Event) -> bool {
        let kind = event.kind();
        if self.bridge.dispatch(&event) {
            return true;
        }
        self.report(SessionError::DispatchRejected(kind));
        false
    }

    /// Send a fatal condition to the registry owner.
    pub(crate) fn report(&self, error: SessionError) {
        tracing::error!(session = %self.handle, error = %error, "fatal session error");
        let _ = self.fatal.send(FatalReport {
            session: self.handle,
            error,
        });
    }

    /// Leave a topic already removed from the registry.
    async fn finish_leave(&self, left: LeftTopic) {
        left.cancel.cancel();
        if let Err(e) = left.topic.close().await {
            verbose!(self, session = %self.handle, topic = %left.handle, error = %e, "topic close failed");
        }
        tracing::debug!(session = %self.handle, topic = %left.handle, "topic left");
        self.dispatch(Event::TopicLeft {
            session: self.handle,
            topic: left.handle,
        });
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A live session. Cloning shares the session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Build the identity and network. Nothing runs until
    /// [`start`](Self::start).
    pub(crate) async fn open(
        handle: SessionHandle,
        mut config: SessionConfig,
        factory: &dyn NetworkFactory,
        bridge: EventBridge,
        fatal: mpsc::UnboundedSender<FatalReport>,
    ) -> Result<Self, SessionError> {
        let identity = Identity::from_material(&config.key_material)?;
        config.key_material = Zeroizing::new(Vec::new());

        let network = factory
            .build(NetworkParams {
                listen_address: config.listen_address.clone(),
                identity,
                pubsub_mode: config.pubsub_mode,
                verbose: config.verbose,
            })
            .await
            .map_err(SessionError::Network)?;

        tracing::info!(
            session = %handle,
            local_id = %network.local_id(),
            listen = %config.listen_address,
            rendezvous = %config.rendezvous_topic,
            "session opened"
        );

        let (discovery_tx, _) = watch::channel(DiscoveryState::Bootstrapping);
        let shared = Arc::new(Shared {
            handle,
            config,
            network,
            topics: Mutex::new(TopicRegistry::new()),
            peers: Mutex::new(PeerTracker::new()),
            bridge,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            discovery: discovery_tx,
            fatal,
        });

        Ok(Session { shared })
    }

    /// Start discovery and peer tracking, then join the rendezvous topic as
    /// topic 0. The session must already be reachable through its handle so
    /// an early fatal report can be acted on.
    pub(crate) async fn start(&self) -> Result<TopicHandle, SessionError> {
        let s = &self.shared;
        s.tasks.spawn(discovery::run(s.clone()));
        s.tasks.spawn(tracker::run(s.clone()));
        self.join(&s.config.rendezvous_topic).await
    }

    pub fn handle(&self) -> SessionHandle {
        self.shared.handle
    }

    pub fn local_id(&self) -> PeerId {
        self.shared.network.local_id()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn bridge(&self) -> &EventBridge {
        &self.shared.bridge
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        *self.shared.discovery.borrow()
    }

    pub fn watch_discovery(&self) -> watch::Receiver<DiscoveryState> {
        self.shared.discovery.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Peers seen on the last tracking tick.
    pub async fn peers(&self) -> BTreeSet<PeerId> {
        self.shared.peers.lock().await.current().clone()
    }

    pub async fn topics(&self) -> Vec<TopicInfo> {
        self.shared.topics.lock().await.list()
    }

    // ── Topic operations ──────────────────────────────────────────────────────

    /// Join `name` and start its receive loop.
    pub async fn join(&self, name: &str) -> Result<TopicHandle, SessionError> {
        let s = &self.shared;
        let mut topics = s.topics.lock().await;
        if s.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }
        if topics.is_joined(name) {
            return Err(SessionError::AlreadyJoined(name.to_string()));
        }

        let (topic, subscription) =
            s.network
                .join(name)
                .await
                .map_err(|source| SessionError::Join {
                    topic: name.to_string(),
                    source,
                })?;

        let cancel = s.cancel.child_token();
        let handle = topics.insert(name, topic, cancel.clone());
        s.tasks.spawn(receiver::run(
            s.clone(),
            handle,
            name.to_string(),
            subscription,
            cancel,
        ));

        tracing::debug!(session = %s.handle, topic = %handle, name, "topic joined");
        // Under the lock so TopicJoined always precedes this topic's TopicLeft.
        s.dispatch(Event::TopicJoined {
            session: s.handle,
            topic: handle,
        });
        Ok(handle)
    }

    pub async fn find(&self, name: &str) -> Option<TopicHandle> {
        self.shared.topics.lock().await.find(name)
    }

    pub async fn name(&self, topic: TopicHandle) -> Option<String> {
        self.shared.topics.lock().await.name(topic).map(str::to_string)
    }

    /// `false` for unknown or already-left topics.
    pub async fn leave(&self, topic: TopicHandle) -> bool {
        let mut topics = self.shared.topics.lock().await;
        let Some(left) = topics.tombstone(topic) else {
            return false;
        };
        self.shared.finish_leave(left).await;
        true
    }

    /// Best-effort broadcast. `false` when the topic is not joined or the
    /// pub/sub engine refuses the message.
    pub async fn publish(&self, topic: TopicHandle, data: impl Into<Bytes>) -> bool {
        let Some(pubsub) = self.shared.topics.lock().await.topic(topic) else {
            return false;
        };
        match pubsub.publish(data.into()).await {
            Ok(()) => true,
            Err(e) => {
                verbose!(self.shared, session = %self.shared.handle, topic = %topic, error = %e, "publish failed");
                false
            }
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Stop everything, leave every joined topic, close the network and
    /// wait for background activities to finish.
    pub(crate) async fn close(&self) {
        let s = &self.shared;
        s.cancel.cancel();

        {
            let mut topics = s.topics.lock().await;
            for left in topics.tombstone_all() {
                s.finish_leave(left).await;
            }
        }

        if let Err(e) = s.network.close().await {
            verbose!(s, session = %s.handle, error = %e, "network close failed");
        }

        s.tasks.close();
        s.tasks.wait().await;
    }

    /// `close`, then emit `SessionClosed` and drop the callback bindings.
    pub(crate) async fn shutdown(&self) {
        self.close().await;
        self.shared.dispatch(Event::SessionClosed {
            session: self.shared.handle,
        });
        self.shared.bridge.clear();
        tracing::info!(session = %self.shared.handle, "session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.shared.handle)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
