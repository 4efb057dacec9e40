//! /status, /keys, /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use murmur_core::identity::generate_key;
use murmur_core::{FatalPolicy, PubsubMode};

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub sessions: usize,
    pub uptime_secs: u64,
    pub defaults: DefaultsInfo,
}

#[derive(Serialize)]
pub struct DefaultsInfo {
    pub listen_address: String,
    pub rendezvous_topic: String,
    pub connection_timeout_secs: f64,
    pub pubsub_mode: PubsubMode,
    pub bootstrap_peers: usize,
    pub fatal_policy: FatalPolicy,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let session = &state.config.session;
    Json(StatusResponse {
        sessions: state.registry.count(),
        uptime_secs: state.started.elapsed().as_secs(),
        defaults: DefaultsInfo {
            listen_address: session.listen_address.clone(),
            rendezvous_topic: session.rendezvous_topic.clone(),
            connection_timeout_secs: session.connection_timeout_secs,
            pubsub_mode: session.pubsub_mode,
            bootstrap_peers: state.config.network.bootstrap_peers.len(),
            fatal_policy: state.config.runtime.fatal_policy,
        },
    })
}

// ── /keys ─────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct KeygenResponse {
    /// Hex-encoded key material, accepted by `POST /sessions` as `key`.
    pub key: String,
}

pub async fn handle_keygen() -> Json<KeygenResponse> {
    Json(KeygenResponse {
        key: hex::encode(generate_key()),
    })
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
