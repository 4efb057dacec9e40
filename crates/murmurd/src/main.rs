//! murmurd — multi-tenant p2p pub/sub session daemon.

use std::sync::Arc;

use anyhow::{Context, Result};

use murmur_api::ApiState;
use murmur_core::{FatalPolicy, Identity, MurmurConfig, SessionHandle};
use murmur_net::Libp2pFactory;
use murmur_sessions::{SessionConfig, SessionRegistry};

mod fatal;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = MurmurConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MurmurConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MurmurConfig::default()
    });
    let config = Arc::new(config);
    tracing::info!(
        port = config.api.port,
        listen = %config.session.listen_address,
        rendezvous = %config.session.rendezvous_topic,
        fatal_policy = ?config.runtime.fatal_policy,
        "murmurd starting"
    );

    let (registry, fatal_rx) = SessionRegistry::new(Arc::new(Libp2pFactory));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let state = ApiState::new(registry.clone(), config.clone(), shutdown_tx.clone());

    if config.session.autostart {
        autostart(&state).await?;
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let api_task = tokio::spawn(murmur_api::serve(state.clone(), config.api.port));
    let fatal_task = tokio::spawn(fatal::watch(
        fatal_rx,
        config.runtime.fatal_policy,
        state.clone(),
    ));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    let failed = tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("shutting down");
            false
        }
        r = api_task => {
            tracing::error!("API server exited: {:?}", r);
            true
        }
        r = fatal_task => match r {
            Ok(Some(report)) => {
                tracing::error!(
                    session = %report.session,
                    error = %report.error,
                    "fatal session error, terminating"
                );
                true
            }
            r => {
                tracing::error!("fatal watcher exited: {:?}", r.map(|_| ()));
                config.runtime.fatal_policy == FatalPolicy::Terminate
            }
        },
    };

    registry.shutdown_all().await;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Open the default session with the key stored at `session.key_path`.
async fn autostart(state: &ApiState) -> Result<SessionHandle> {
    let defaults = &state.config.session;
    let identity = Identity::load_or_generate(&defaults.key_path)
        .with_context(|| format!("failed to load key {}", defaults.key_path.display()))?;

    let config = SessionConfig::from_defaults(defaults, &state.config.network)
        .with_key(&identity.to_bytes());
    let handle = state
        .open_session(config)
        .await
        .context("failed to open autostart session")?;

    tracing::info!(session = %handle, key = %defaults.key_path.display(), "autostart session opened");
    Ok(handle)
}
