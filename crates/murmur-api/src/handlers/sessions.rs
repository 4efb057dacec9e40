//! /sessions handlers — open, list, inspect and close sessions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use murmur_core::{PubsubMode, SessionHandle};
use murmur_sessions::{DiscoveryState, Session, SessionConfig};

use super::{parse_session, session_error, ApiError, ApiState};

#[derive(Serialize)]
pub struct SessionSummary {
    /// `index.generation`, the form every `/sessions/{id}` route accepts.
    pub handle: String,
    pub raw: u64,
    pub local_id: String,
    pub discovery: DiscoveryState,
    pub topics: usize,
    pub peers: usize,
}

async fn summarize(session: &Session) -> SessionSummary {
    let handle = session.handle();
    SessionSummary {
        handle: handle.to_string(),
        raw: handle.to_raw(),
        local_id: session.local_id().to_string(),
        discovery: session.discovery_state(),
        topics: session.topics().await.iter().filter(|t| t.joined).count(),
        peers: session.peers().await.len(),
    }
}

// ── /sessions (GET) ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

pub async fn handle_sessions(State(state): State<ApiState>) -> Json<SessionsResponse> {
    let mut sessions = Vec::new();
    for handle in state.registry.handles() {
        // Skip sessions destroyed since `handles()` was taken.
        if let Ok(session) = state.registry.get(handle) {
            sessions.push(summarize(&session).await);
        }
    }
    Json(SessionsResponse { sessions })
}

// ── /sessions (POST) ──────────────────────────────────────────────────────────

/// Every field falls back to the daemon's `[session]` defaults.
#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    pub listen_address: Option<String>,
    pub rendezvous_topic: Option<String>,
    /// Hex-encoded key material; omitted generates a fresh identity.
    pub key: Option<String>,
    pub connection_timeout_secs: Option<f64>,
    pub pubsub_mode: Option<PubsubMode>,
    pub verbose: Option<bool>,
}

impl OpenSessionRequest {
    fn into_config(self, state: &ApiState) -> Result<SessionConfig, ApiError> {
        let mut config =
            SessionConfig::from_defaults(&state.config.session, &state.config.network);
        if let Some(listen_address) = self.listen_address {
            config.listen_address = listen_address;
        }
        if let Some(rendezvous_topic) = self.rendezvous_topic {
            config.rendezvous_topic = rendezvous_topic;
        }
        if let Some(key) = self.key {
            let bytes = hex::decode(key.trim())
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid hex key".to_string()))?;
            config = config.with_key(&bytes);
        }
        if let Some(secs) = self.connection_timeout_secs {
            config = config.with_timeout_secs(secs);
        }
        if let Some(mode) = self.pubsub_mode {
            config = config.with_pubsub_mode(mode);
        }
        if let Some(verbose) = self.verbose {
            config = config.with_verbose(verbose);
        }
        Ok(config)
    }
}

pub async fn handle_session_open(
    State(state): State<ApiState>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<Json<SessionSummary>, ApiError> {
    let config = req.into_config(&state)?;
    let handle = state.open_session(config).await.map_err(session_error)?;
    let session = state.registry.get(handle).map_err(session_error)?;

    tracing::info!(session = %handle, local_id = %session.local_id(), "session opened via API");
    Ok(Json(summarize(&session).await))
}

// ── /sessions/{id} (GET) ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TopicView {
    pub topic: u32,
    pub name: String,
    pub joined: bool,
}

#[derive(Serialize)]
pub struct SessionInspectResponse {
    pub handle: String,
    pub raw: u64,
    pub local_id: String,
    pub listen_address: String,
    pub rendezvous_topic: String,
    pub pubsub_mode: PubsubMode,
    pub connection_timeout_secs: f64,
    pub verbose: bool,
    pub discovery: DiscoveryState,
    pub topics: Vec<TopicView>,
    pub peers: Vec<String>,
    pub pending_events: usize,
}

pub async fn handle_session_inspect(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInspectResponse>, ApiError> {
    let handle = parse_session(&id, &state)?;
    let session = state.registry.get(handle).map_err(session_error)?;
    let config = session.config();

    let topics = session
        .topics()
        .await
        .into_iter()
        .map(|t| TopicView {
            topic: t.handle.0,
            name: t.name,
            joined: t.joined,
        })
        .collect();
    let peers = session
        .peers()
        .await
        .into_iter()
        .map(|p| p.to_string())
        .collect();

    Ok(Json(SessionInspectResponse {
        handle: handle.to_string(),
        raw: handle.to_raw(),
        local_id: session.local_id().to_string(),
        listen_address: config.listen_address.clone(),
        rendezvous_topic: config.rendezvous_topic.clone(),
        pubsub_mode: config.pubsub_mode,
        connection_timeout_secs: config.connection_timeout.as_secs_f64(),
        verbose: config.verbose,
        discovery: session.discovery_state(),
        topics,
        peers,
        pending_events: state.events.pending(handle),
    }))
}

// ── /sessions/{id} (DELETE) ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionCloseResponse {
    pub handle: String,
    pub closed: bool,
}

pub async fn handle_session_close(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SessionCloseResponse>, ApiError> {
    let handle: SessionHandle = id.parse().map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let closed = state.close_session(handle).await;

    if closed {
        tracing::info!(session = %handle, "session closed via API");
    }

    Ok(Json(SessionCloseResponse {
        handle: handle.to_string(),
        closed,
    }))
}
