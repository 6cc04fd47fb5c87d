//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use rotor_core::{BackendRegistry, SharedRegistry};
use rotor_proxy::{Dispatcher, Listener, RelayConfig, Shutdown};

/// A backend that reads the whole request, then answers `tag` followed by
/// the request bytes and closes.
pub struct TaggedBackend {
    pub addr: SocketAddr,
    connections: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TaggedBackend {
    pub async fn spawn(tag: &'static str) -> io::Result<Self> {
        Self::spawn_on("127.0.0.1:0".parse().unwrap(), tag).await
    }

    pub async fn spawn_on(addr: SocketAddr, tag: &'static str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let counter = Arc::clone(&connections);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((mut stream, _)) = accepted else { break };
                        counter.fetch_add(1, Ordering::Relaxed);
                        tokio::spawn(async move {
                            let mut request = Vec::new();
                            if stream.read_to_end(&mut request).await.is_err() {
                                return;
                            }
                            let _ = stream.write_all(tag.as_bytes()).await;
                            let _ = stream.write_all(&request).await;
                            let _ = stream.shutdown().await;
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Stop accepting and wait until the port is released.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TaggedBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A listener + dispatcher pair on an ephemeral port. No prober runs;
/// tests drive liveness directly.
pub struct Balancer {
    pub addr: SocketAddr,
    pub registry: SharedRegistry,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl Balancer {
    pub async fn spawn(backends: &[SocketAddr]) -> Self {
        Self::spawn_with(backends, false, RelayConfig::default()).await
    }

    pub async fn spawn_with(backends: &[SocketAddr], failover: bool, relay: RelayConfig) -> Self {
        let registry = Arc::new(
            BackendRegistry::new(backends.iter().map(|addr| addr.to_string())).unwrap(),
        );
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&registry))
                .with_connect_timeout(Duration::from_millis(500))
                .with_failover(failover)
                .with_relay_config(relay),
        );

        let listener = Listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(listener.run(dispatcher, shutdown.subscribe()));

        Self {
            addr,
            registry,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.task.await;
    }
}

/// Send `payload`, half-close, and collect everything until EOF.
pub async fn roundtrip(addr: SocketAddr, payload: &[u8]) -> io::Result<Vec<u8>> {
    timeout(Duration::from_secs(10), async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(payload).await?;
        stream.shutdown().await?;
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        Ok::<_, io::Error>(reply)
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "roundtrip timed out"))?
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A listener whose accept queue is full and never drained, so a further
/// connect neither succeeds nor fails until the caller gives up.
pub struct StalledBackend {
    pub addr: SocketAddr,
    _listener: TcpListener,
    _queued: Vec<TcpStream>,
}

impl StalledBackend {
    pub async fn spawn() -> io::Result<Self> {
        let socket = TcpSocket::new_v4()?;
        socket.bind("127.0.0.1:0".parse().unwrap())?;
        let listener = socket.listen(1)?;
        let addr = listener.local_addr()?;

        let mut queued = Vec::new();
        while queued.len() < 32 {
            match timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(stream) => queued.push(stream?),
                Err(_) => {
                    return Ok(Self {
                        addr,
                        _listener: listener,
                        _queued: queued,
                    })
                }
            }
        }
        Err(io::Error::other("accept queue never filled up"))
    }
}
