//! Per-connection dispatch: pick a backend, dial it, relay.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use rotor_core::{SharedBackend, SharedRegistry};

use crate::error::DispatchError;
use crate::relay::{relay, RelayConfig, RelaySummary};

/// Default connect timeout for backend connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Routes client connections to backends from a shared registry.
///
/// The dispatcher only reads liveness; a failed dial does not mark the
/// backend down, that is left to the prober.
#[derive(Debug)]
pub struct Dispatcher {
    registry: SharedRegistry,
    connect_timeout: Duration,
    failover: bool,
    relay: RelayConfig,
}

impl Dispatcher {
    /// Create a dispatcher with default timeouts and failover disabled.
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            failover: false,
            relay: RelayConfig::default(),
        }
    }

    /// Bound every backend dial by `connect_timeout`.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// On a failed dial, select again and retry, up to one attempt per backend.
    pub fn with_failover(mut self, failover: bool) -> Self {
        self.failover = failover;
        self
    }

    /// Tunables passed to every relay session.
    pub fn with_relay_config(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// The registry backends are chosen from.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Serve one client connection to completion.
    ///
    /// On any error before the relay starts, `client` is dropped, which
    /// closes it.
    pub async fn dispatch<S>(&self, client: S) -> Result<RelaySummary, DispatchError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (backend, upstream) = self.connect().await?;
        debug!(backend = %backend.addr, id = backend.id.0, "Balancing connection");

        let summary = relay(client, upstream, &self.relay).await?;
        Ok(summary)
    }

    async fn connect(&self) -> Result<(SharedBackend, TcpStream), DispatchError> {
        let attempts = if self.failover { self.registry.len() } else { 1 };
        let mut last_failure = None;

        for attempt in 1..=attempts {
            let Some(backend) = self.registry.select() else {
                return Err(last_failure.unwrap_or(DispatchError::AllBackendsDown));
            };

            match self.dial(&backend.addr).await {
                Ok(stream) => return Ok((backend, stream)),
                Err(source) => {
                    warn!(
                        backend = %backend.addr,
                        attempt,
                        attempts,
                        error = %source,
                        "Backend dial failed"
                    );
                    last_failure = Some(DispatchError::Dial {
                        addr: backend.addr.clone(),
                        source,
                    });
                }
            }
        }

        Err(last_failure.unwrap_or(DispatchError::AllBackendsDown))
    }

    async fn dial(&self, addr: &str) -> io::Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timeout",
            )),
        }
    }
}
