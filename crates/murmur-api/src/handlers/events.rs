//! /sessions/{id}/events handler — drains the session's event log.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use murmur_core::Event;

use super::{parse_session, ApiError, ApiState};

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
}

pub async fn handle_events(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<EventsResponse>, ApiError> {
    let handle = parse_session(&id, &state)?;
    Ok(Json(EventsResponse {
        events: state.events.drain(handle),
    }))
}
