//! Interactive chat over one topic.
//!
//! Joins the topic (or reuses it when the session already has it), publishes
//! every stdin line, and prints messages other peers send to it.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::events::{self, EventJson};
use super::http::{base_url, get_json};
use super::topics;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Last eight characters of a peer id.
fn short(id: &str) -> &str {
    id.char_indices()
        .rev()
        .nth(7)
        .map(|(i, _)| &id[i..])
        .unwrap_or(id)
}

pub async fn cmd_chat(port: u16, session: &str, name: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct SessionInfo {
        local_id: String,
    }

    let info: SessionInfo = get_json(&format!("{}/sessions/{}", base_url(port), session)).await?;
    let topic = match topics::find(port, session, name).await? {
        Some(topic) => topic,
        None => topics::join(port, session, name).await?.topic,
    };

    println!(
        "Chatting on {} (#{}) as {}. Ctrl-D to quit.",
        name,
        topic,
        short(&info.local_id)
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if !topics::publish(port, session, topic, line.into_bytes()).await? {
                        eprintln!("✗ publish failed");
                    }
                }
                None => break,
            },
            _ = tick.tick() => {
                for event in events::drain(port, session).await? {
                    match event {
                        EventJson::MessageReceived { message }
                            if message.topic == name && message.received_from != info.local_id =>
                        {
                            let from = message.from.as_deref().unwrap_or(&message.received_from);
                            println!("[{}] {}", short(from), String::from_utf8_lossy(&message.data));
                        }
                        EventJson::SessionClosed {} => {
                            println!("Session closed.");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::short;

    #[test]
    fn short_keeps_the_tail() {
        assert_eq!(short("12D3KooWAbCdEfGh12345678"), "12345678");
        assert_eq!(short("abc"), "abc");
        assert_eq!(short(""), "");
    }
}
