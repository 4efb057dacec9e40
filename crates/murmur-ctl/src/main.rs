//! murmur-ctl — command-line interface for the murmur daemon.

use anyhow::{Context, Result};

mod cmd;

use cmd::sessions::OpenRequest;

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: murmur-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                          Show daemon status and session defaults");
    println!("  keygen                          Generate key material for `open --key`");
    println!("  sessions                        List open sessions");
    println!("  open [options]                  Open a session");
    println!("      --listen <addr>  --rendezvous <topic>  --key <hex>");
    println!("      --timeout <secs>  --mode gossip|flood  --verbose");
    println!("  close <session>                 Close a session");
    println!("  inspect <session>               Show a session's topics and peers");
    println!("  join <session> <name>           Join a topic");
    println!("  find <session> <name>           Look up a joined topic's handle");
    println!("  leave <session> <topic>         Leave a topic");
    println!("  publish <session> <topic> <text>  Publish a message");
    println!("  events <session> [--follow]     Drain (or follow) the session's events");
    println!("  chat <session> <name>           Interactive chat on a topic");
    println!("  shutdown                        Stop the daemon");
    println!();
    println!("Sessions are written index.generation, e.g. 0.0.");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

fn topic_arg(topic: &str) -> Result<u32> {
    topic.parse().context("topic must be a number")
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["keygen"] => cmd::status::cmd_keygen(port).await,
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["sessions"] => cmd::sessions::cmd_sessions(port).await,
        ["open", options @ ..] => {
            let req = OpenRequest::parse(options)?;
            cmd::sessions::cmd_open(port, &req).await
        }
        ["close", session] => cmd::sessions::cmd_close(port, session).await,
        ["inspect", session] => cmd::sessions::cmd_inspect(port, session).await,
        ["join", session, name] => cmd::topics::cmd_join(port, session, name).await,
        ["find", session, name] => cmd::topics::cmd_find(port, session, name).await,
        ["leave", session, topic] => {
            cmd::topics::cmd_leave(port, session, topic_arg(topic)?).await
        }
        ["publish", session, topic, text @ ..] if !text.is_empty() => {
            cmd::topics::cmd_publish(port, session, topic_arg(topic)?, &text.join(" ")).await
        }
        ["events", session] => cmd::events::cmd_events(port, session, false).await,
        ["events", session, "--follow"] => cmd::events::cmd_events(port, session, true).await,
        ["chat", session, name] => cmd::chat::cmd_chat(port, session, name).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
