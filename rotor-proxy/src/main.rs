//! Rotor Proxy Engine
//!
//! Composition root: loads configuration, builds the backend registry, starts
//! the health prober and the listener, and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use rotor_proxy::config::{Cli, Config};
use rotor_proxy::{logging, Dispatcher, HealthProber, Listener, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli).context("failed to load configuration")?;
    logging::init(&config.log).context("failed to initialize logging")?;

    info!(
        listen = %config.listen,
        backends = ?config.backends,
        probe_interval_ms = config.health.interval_ms,
        failover = config.dispatch.failover,
        "Starting Rotor"
    );

    let registry = Arc::new(config.build_registry()?);
    let shutdown = Shutdown::new();

    let prober = HealthProber::new(
        Arc::clone(&registry),
        config.health_interval(),
        config.probe_timeout(),
    )
    .with_mode(config.health.mode);
    let prober_task = prober.spawn(shutdown.subscribe());

    let listener = Listener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    let dispatcher = Arc::new(
        Dispatcher::new(registry)
            .with_connect_timeout(config.connect_timeout())
            .with_failover(config.dispatch.failover)
            .with_relay_config(config.relay_config()),
    );
    let server_task = tokio::spawn(listener.run(dispatcher, shutdown.subscribe()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");
    shutdown.trigger();

    for (name, task) in [("listener", server_task), ("health prober", prober_task)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Task ended abnormally");
        }
    }

    info!("Shutting down");
    Ok(())
}
