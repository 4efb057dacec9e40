//! HTTP API handlers — exposes the session registry as JSON.

pub mod events;
pub mod sessions;
pub mod status;
pub mod topics;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;

use murmur_core::{MurmurConfig, SessionHandle, TopicHandle};
use murmur_sessions::{SessionConfig, SessionError, SessionRegistry};

use crate::events::EventLog;

#[derive(Clone)]
pub struct ApiState {
    pub registry: SessionRegistry,
    pub events: EventLog,
    /// Defaults for sessions opened without explicit settings.
    pub config: Arc<MurmurConfig>,
    pub started: Instant,
    /// Shutdown broadcast sender. Fires once on a graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ApiState {
    pub fn new(
        registry: SessionRegistry,
        config: Arc<MurmurConfig>,
        shutdown_tx: tokio::sync::broadcast::Sender<()>,
    ) -> Self {
        Self {
            registry,
            events: EventLog::new(config.api.event_log_capacity),
            config,
            started: Instant::now(),
            shutdown_tx,
        }
    }

    /// Open a session whose events land in the API event log.
    pub async fn open_session(&self, config: SessionConfig) -> Result<SessionHandle, SessionError> {
        self.registry
            .create_with_bridge(config, self.events.bridge())
            .await
    }

    /// Destroy a session and drop its queued events.
    pub async fn close_session(&self, handle: SessionHandle) -> bool {
        let closed = self.registry.destroy(handle).await;
        if closed {
            self.events.forget(handle);
        }
        closed
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

type ApiError = (StatusCode, String);

/// Parse `index.generation` (or a bare index) into a live session handle.
fn parse_session(id: &str, state: &ApiState) -> Result<SessionHandle, ApiError> {
    let handle: SessionHandle = id.parse().map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    if !state.registry.is_valid(handle) {
        return Err((StatusCode::NOT_FOUND, format!("session {handle} not found")));
    }
    Ok(handle)
}

fn parse_topic(topic: &str) -> Result<TopicHandle, ApiError> {
    topic
        .parse()
        .map(TopicHandle)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid topic handle {topic:?}")))
}

fn session_error(e: SessionError) -> ApiError {
    let status = match &e {
        SessionError::UnknownSession(_) => StatusCode::NOT_FOUND,
        SessionError::AlreadyJoined(_) | SessionError::Closed => StatusCode::CONFLICT,
        SessionError::Identity(_) => StatusCode::BAD_REQUEST,
        SessionError::Network(_) | SessionError::Join { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[cfg(test)]
pub(crate) fn test_state() -> ApiState {
    let (registry, _fatal) =
        SessionRegistry::new(Arc::new(murmur_sessions::MemoryHub::new()));
    let mut config = MurmurConfig::default();
    config.network.bootstrap_peers.clear();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    ApiState::new(registry, Arc::new(config), shutdown_tx)
}

// Re-export handler functions for use in router setup.
pub use events::handle_events;
pub use sessions::{
    handle_session_close, handle_session_inspect, handle_session_open, handle_sessions,
};
pub use status::{handle_keygen, handle_shutdown, handle_status};
pub use topics::{
    handle_publish, handle_topic_join, handle_topic_leave, handle_topic_name, handle_topics,
};
