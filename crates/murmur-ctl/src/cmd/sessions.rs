//! Session management commands.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::http::{base_url, delete_json, get_json, post_json_body};

#[derive(Deserialize)]
struct SessionSummary {
    handle: String,
    local_id: String,
    discovery: String,
    topics: usize,
    peers: usize,
}

fn print_summary(s: &SessionSummary) {
    println!("  ┌─ session {}", s.handle);
    println!("  │  local id  : {}", s.local_id);
    println!("  │  discovery : {}", s.discovery);
    println!("  │  topics    : {}", s.topics);
    println!("  └─ peers     : {}", s.peers);
}

pub async fn cmd_sessions(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct SessionsResponse {
        sessions: Vec<SessionSummary>,
    }

    let resp: SessionsResponse = get_json(&format!("{}/sessions", base_url(port))).await?;
    if resp.sessions.is_empty() {
        println!("No open sessions.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Sessions ({})", resp.sessions.len());
    println!("═══════════════════════════════════════");
    for s in &resp.sessions {
        print_summary(s);
    }
    Ok(())
}

/// `open` flags; anything left out uses the daemon's defaults.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct OpenRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendezvous_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_timeout_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubsub_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

impl OpenRequest {
    pub fn parse(args: &[&str]) -> Result<Self> {
        let mut req = Self::default();
        let mut it = args.iter();
        while let Some(flag) = it.next() {
            let mut value = || -> Result<String> {
                it.next()
                    .map(|v| v.to_string())
                    .with_context(|| format!("{flag} requires a value"))
            };
            match *flag {
                "--listen" => req.listen_address = Some(value()?),
                "--rendezvous" => req.rendezvous_topic = Some(value()?),
                "--key" => req.key = Some(value()?),
                "--timeout" => {
                    req.connection_timeout_secs =
                        Some(value()?.parse().context("--timeout must be seconds")?)
                }
                "--mode" => {
                    let mode = value()?;
                    if mode != "gossip" && mode != "flood" {
                        bail!("--mode must be gossip or flood");
                    }
                    req.pubsub_mode = Some(mode);
                }
                "--verbose" => req.verbose = Some(true),
                other => bail!("unknown open option: {other}"),
            }
        }
        Ok(req)
    }
}

pub async fn cmd_open(port: u16, req: &OpenRequest) -> Result<()> {
    let resp: SessionSummary =
        post_json_body(&format!("{}/sessions", base_url(port)), req).await?;
    println!("✓ Session opened");
    print_summary(&resp);
    Ok(())
}

pub async fn cmd_close(port: u16, session: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct CloseResponse {
        handle: String,
        closed: bool,
    }

    let resp: CloseResponse =
        delete_json(&format!("{}/sessions/{}", base_url(port), session)).await?;
    if resp.closed {
        println!("✓ Session closed: {}", resp.handle);
    } else {
        println!("Session not found: {}", session);
    }
    Ok(())
}

pub async fn cmd_inspect(port: u16, session: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct TopicView {
        topic: u32,
        name: String,
        joined: bool,
    }

    #[derive(Deserialize)]
    struct InspectResponse {
        handle: String,
        raw: u64,
        local_id: String,
        listen_address: String,
        rendezvous_topic: String,
        pubsub_mode: String,
        connection_timeout_secs: f64,
        verbose: bool,
        discovery: String,
        topics: Vec<TopicView>,
        peers: Vec<String>,
        pending_events: usize,
    }

    let resp: InspectResponse =
        get_json(&format!("{}/sessions/{}", base_url(port), session)).await?;

    println!("═══════════════════════════════════════");
    println!("  Session {} (raw {})", resp.handle, resp.raw);
    println!("═══════════════════════════════════════");
    println!("  Local id   : {}", resp.local_id);
    println!("  Listen     : {}", resp.listen_address);
    println!("  Rendezvous : {}", resp.rendezvous_topic);
    println!("  Pubsub     : {}", resp.pubsub_mode);
    println!("  Timeout    : {}s", resp.connection_timeout_secs);
    println!("  Verbose    : {}", resp.verbose);
    println!("  Discovery  : {}", resp.discovery);
    println!("  Events     : {} pending", resp.pending_events);

    println!("\n  Topics:");
    for t in &resp.topics {
        let state = if t.joined { "joined" } else { "left" };
        println!("    #{:<3} {:<32} {}", t.topic, t.name, state);
    }

    if resp.peers.is_empty() {
        println!("\n  No peers.");
    } else {
        println!("\n  Peers:");
        for p in &resp.peers {
            println!("    {}", p);
        }
    }
    Ok(())
}
