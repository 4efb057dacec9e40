//! /sessions/{id}/topics handlers — join, look up, leave and publish.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{parse_session, parse_topic, session_error, ApiError, ApiState};
use super::sessions::TopicView;

#[derive(Serialize)]
pub struct TopicResponse {
    pub topic: u32,
    pub name: String,
}

// ── /sessions/{id}/topics (POST) ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct JoinRequest {
    pub name: String,
}

pub async fn handle_topic_join(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<TopicResponse>, ApiError> {
    let handle = parse_session(&id, &state)?;
    let topic = state
        .registry
        .join(handle, &req.name)
        .await
        .map_err(session_error)?;

    tracing::info!(session = %handle, topic = %topic, name = %req.name, "topic joined via API");
    Ok(Json(TopicResponse {
        topic: topic.0,
        name: req.name,
    }))
}

// ── /sessions/{id}/topics (GET) ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TopicQuery {
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<TopicView>,
}

/// Every slot, or with `?name=` only the joined topic of that name.
pub async fn handle_topics(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<TopicQuery>,
) -> Result<Json<TopicsResponse>, ApiError> {
    let handle = parse_session(&id, &state)?;

    if let Some(name) = query.name {
        let topic = state
            .registry
            .find(handle, &name)
            .await
            .ok_or((StatusCode::NOT_FOUND, format!("topic {name:?} not joined")))?;
        return Ok(Json(TopicsResponse {
            topics: vec![TopicView {
                topic: topic.0,
                name,
                joined: true,
            }],
        }));
    }

    let session = state.registry.get(handle).map_err(session_error)?;
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
    Ok(Json(TopicsResponse { topics }))
}

// ── /sessions/{id}/topics/{topic} (GET) ───────────────────────────────────────

pub async fn handle_topic_name(
    State(state): State<ApiState>,
    Path((id, topic)): Path<(String, String)>,
) -> Result<Json<TopicResponse>, ApiError> {
    let handle = parse_session(&id, &state)?;
    let topic = parse_topic(&topic)?;
    let name = state
        .registry
        .name(handle, topic)
        .await
        .ok_or((StatusCode::NOT_FOUND, format!("topic {topic} not joined")))?;
    Ok(Json(TopicResponse {
        topic: topic.0,
        name,
    }))
}

// ── /sessions/{id}/topics/{topic} (DELETE) ────────────────────────────────────

#[derive(Serialize)]
pub struct LeaveResponse {
    pub topic: u32,
    pub left: bool,
}

pub async fn handle_topic_leave(
    State(state): State<ApiState>,
    Path((id, topic)): Path<(String, String)>,
) -> Result<Json<LeaveResponse>, ApiError> {
    let handle = parse_session(&id, &state)?;
    let topic = parse_topic(&topic)?;
    let left = state.registry.leave(handle, topic).await;
    Ok(Json(LeaveResponse {
        topic: topic.0,
        left,
    }))
}

// ── /sessions/{id}/topics/{topic}/publish (POST) ──────────────────────────────

#[derive(Serialize)]
pub struct PublishResponse {
    pub topic: u32,
    pub bytes: usize,
    pub published: bool,
}

/// The raw request body is the message.
pub async fn handle_publish(
    State(state): State<ApiState>,
    Path((id, topic)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<PublishResponse>, ApiError> {
    let handle = parse_session(&id, &state)?;
    let topic = parse_topic(&topic)?;
    let bytes = body.len();
    let published = state.registry.publish(handle, topic, body).await;
    Ok(Json(PublishResponse {
        topic: topic.0,
        bytes,
        published,
    }))
}
