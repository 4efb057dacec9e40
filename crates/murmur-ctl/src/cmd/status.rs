//! Daemon status, key generation and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct StatusResponse {
    sessions: usize,
    uptime_secs: u64,
    defaults: DefaultsInfo,
}

#[derive(Deserialize)]
struct DefaultsInfo {
    listen_address: String,
    rendezvous_topic: String,
    connection_timeout_secs: f64,
    pubsub_mode: String,
    bootstrap_peers: usize,
    fatal_policy: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;
    let d = &resp.defaults;

    println!("═══════════════════════════════════════");
    println!("  murmurd Status");
    println!("═══════════════════════════════════════");
    println!("  Sessions        : {}", resp.sessions);
    println!("  Uptime          : {}s", resp.uptime_secs);
    println!("  Fatal policy    : {}", d.fatal_policy);
    println!();
    println!("  Session defaults:");
    println!("    listen        : {}", d.listen_address);
    println!("    rendezvous    : {}", d.rendezvous_topic);
    println!("    timeout       : {}s", d.connection_timeout_secs);
    println!("    pubsub        : {}", d.pubsub_mode);
    println!("    bootstrap     : {} peers", d.bootstrap_peers);

    Ok(())
}

pub async fn cmd_keygen(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct KeygenResponse {
        key: String,
    }

    let resp: KeygenResponse = post_json(&format!("{}/keys", base_url(port))).await?;
    println!("{}", resp.key);
    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct ShutdownResponse {
        message: String,
    }

    let resp: ShutdownResponse =
        post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
