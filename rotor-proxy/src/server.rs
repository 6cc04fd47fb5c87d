//! Server module: the TCP accept loop in front of the dispatcher.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::shutdown::ShutdownSignal;

/// Pause after a failed accept, so persistent errors don't spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listening socket.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Bind the listen address. Failing here is fatal to the balancer.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(bind_addr = %listener.local_addr()?, "Listener bound");
        Ok(Self { listener })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires, one task per connection.
    ///
    /// Accept errors are logged and never end the loop. Sessions already in
    /// flight are not waited for.
    pub async fn run(self, dispatcher: Arc<Dispatcher>, mut shutdown: ShutdownSignal) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Listener stopping");
                    return;
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(
                        handle_connection(dispatcher, stream)
                            .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(dispatcher: Arc<Dispatcher>, stream: TcpStream) {
    match dispatcher.dispatch(stream).await {
        Ok(summary) => {
            debug!(
                bytes_to_backend = summary.client_to_backend,
                bytes_from_backend = summary.backend_to_client,
                "Connection closed"
            );
        }
        Err(DispatchError::AllBackendsDown) => {
            warn!("All backends are down, closing client");
        }
        Err(e) => {
            warn!(error = %e, "Connection failed");
        }
    }
}
