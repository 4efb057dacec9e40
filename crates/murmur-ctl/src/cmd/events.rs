//! Event log commands.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
pub struct MessageJson {
    pub from: Option<String>,
    pub data: Vec<u8>,
    pub topic: String,
    pub received_from: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventJson {
    MessageReceived { message: MessageJson },
    PeerConnected { peer: String },
    PeerDisconnected { peer: String },
    TopicJoined { topic: u32 },
    TopicLeft { topic: u32 },
    DiscoveryCompleted {},
    SessionClosed {},
}

impl std::fmt::Display for EventJson {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventJson::MessageReceived { message } => write!(
                f,
                "message  {} from {}: {}",
                message.topic,
                message.from.as_deref().unwrap_or("?"),
                String::from_utf8_lossy(&message.data)
            ),
            EventJson::PeerConnected { peer } => write!(f, "peer +    {}", peer),
            EventJson::PeerDisconnected { peer } => write!(f, "peer -    {}", peer),
            EventJson::TopicJoined { topic } => write!(f, "joined   #{}", topic),
            EventJson::TopicLeft { topic } => write!(f, "left     #{}", topic),
            EventJson::DiscoveryCompleted {} => write!(f, "discovery completed"),
            EventJson::SessionClosed {} => write!(f, "session closed"),
        }
    }
}

#[derive(Deserialize)]
struct EventsResponse {
    events: Vec<EventJson>,
}

/// Drain whatever is queued for `session`.
pub async fn drain(port: u16, session: &str) -> Result<Vec<EventJson>> {
    let resp: EventsResponse =
        get_json(&format!("{}/sessions/{}/events", base_url(port), session)).await?;
    Ok(resp.events)
}

pub async fn cmd_events(port: u16, session: &str, follow: bool) -> Result<()> {
    loop {
        for event in drain(port, session).await? {
            println!("{}", event);
            if matches!(event, EventJson::SessionClosed {}) {
                return Ok(());
            }
        }
        if !follow {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
