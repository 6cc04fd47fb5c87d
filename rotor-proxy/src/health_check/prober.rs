//! Background prober for active TCP health checks.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use rotor_core::{Backend, SharedRegistry};

use crate::shutdown::ShutdownSignal;

/// Default time between probe rounds.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on a single probe connect.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// How the backends of one round are probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// One backend after the other, in registry order.
    #[default]
    Sequential,
    /// All backends at once; the round ends when every probe has finished.
    Concurrent,
}

/// Periodically connects to every backend and records whether it answered.
///
/// This is the only writer of backend liveness.
#[derive(Debug)]
pub struct HealthProber {
    registry: SharedRegistry,
    interval: Duration,
    timeout: Duration,
    mode: ProbeMode,
}

impl HealthProber {
    /// Create a sequential prober over `registry`.
    pub fn new(registry: SharedRegistry, interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            timeout,
            mode: ProbeMode::Sequential,
        }
    }

    /// Choose how a round fans out.
    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Spawns the probing loop as a background Tokio task.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Probe every `interval` until `shutdown` fires.
    ///
    /// The first round happens one interval after start. Shutdown is only
    /// observed between rounds; a round in progress always completes.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            mode = ?self.mode,
            backends = self.registry.len(),
            "Health prober starting"
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Prevent immediately ticking when spawned
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Health prober stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.probe_all().await;
                }
            }
        }
    }

    /// Run a single probe round and return how many backends are alive after it.
    pub async fn probe_all(&self) -> usize {
        debug!(backends = self.registry.len(), "Starting health check round");

        match self.mode {
            ProbeMode::Sequential => {
                for backend in self.registry.backends() {
                    let outcome = probe(&backend.addr, self.timeout).await;
                    record(backend, outcome);
                }
            }
            ProbeMode::Concurrent => {
                let mut probes = JoinSet::new();
                for backend in self.registry.backends() {
                    let backend = Arc::clone(backend);
                    let timeout = self.timeout;
                    probes.spawn(async move {
                        let outcome = probe(&backend.addr, timeout).await;
                        record(&backend, outcome);
                    });
                }
                while let Some(joined) = probes.join_next().await {
                    if let Err(e) = joined {
                        warn!(error = %e, "Probe task failed");
                    }
                }
            }
        }

        self.registry.alive_count()
    }
}

/// Connect to `addr` within `limit`; the probe connection is dropped at once.
async fn probe(addr: &str, limit: Duration) -> io::Result<()> {
    within(limit, TcpStream::connect(addr)).await.map(drop)
}

/// Give up on `attempt` after `limit`, reporting `TimedOut`.
async fn within<F, T>(limit: Duration, attempt: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "probe timed out")),
    }
}

fn record(backend: &Backend, outcome: io::Result<()>) {
    let was_alive = backend.is_alive();

    match outcome {
        Ok(()) => {
            backend.set_alive(true);
            if !was_alive {
                info!(backend = %backend.addr, id = backend.id.0, "Backend is back up");
            }
        }
        Err(e) => {
            backend.set_alive(false);
            if was_alive {
                warn!(backend = %backend.addr, id = backend.id.0, error = %e, "Backend is down");
            } else {
                debug!(backend = %backend.addr, error = %e, "Backend still down");
            }
        }
    }
}
