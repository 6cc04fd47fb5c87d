//! Duplex byte relay between a client and a backend.
//!
//! Both directions run concurrently. A direction that reaches end-of-stream
//! half-closes its destination, so the peer sees EOF while the opposite
//! direction keeps draining. A direction that fails with a real I/O error
//! stops the opposite direction as well. The session only completes once both
//! directions have stopped; the streams are then dropped, which closes each
//! exactly once.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::{Direction, RelayError};
use crate::shutdown::Shutdown;

/// Default copy buffer per direction.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Tunables for a relay session.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bytes read per copy step in each direction.
    pub buffer_size: usize,
    /// Fail the session once no bytes have moved in either direction for
    /// this long.
    ///
    /// The deadline is shared: a long one-way upload keeps the silent
    /// direction open, so a reply sent after the upload still arrives.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Bytes moved by a completed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Bytes copied from the client to the backend.
    pub client_to_backend: u64,
    /// Bytes copied from the backend to the client.
    pub backend_to_client: u64,
}

/// Relay bytes between `client` and `backend` until both directions finish.
///
/// Errors that only signal the other side of the session going away (reset,
/// broken pipe and friends) count as normal completion. Any other I/O error
/// stops both directions and is returned after both streams have been closed.
pub async fn relay<C, B>(
    client: C,
    backend: B,
    config: &RelayConfig,
) -> Result<RelaySummary, RelayError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);
    let session = Session::new(config);

    let (upstream, downstream) = tokio::join!(
        copy_half(&mut client_read, &mut backend_write, &session),
        copy_half(&mut backend_read, &mut client_write, &session),
    );

    drop(client_read.unsplit(client_write));
    drop(backend_read.unsplit(backend_write));

    let summary = RelaySummary {
        client_to_backend: upstream.bytes,
        backend_to_client: downstream.bytes,
    };

    for (direction, leg) in [
        (Direction::ClientToBackend, upstream),
        (Direction::BackendToClient, downstream),
    ] {
        match leg.error {
            Some(err) if is_session_end(&err) => {
                debug!(%direction, error = %err, bytes = leg.bytes, "Relay leg ended by peer");
            }
            Some(source) => return Err(RelayError::Io { direction, source }),
            None => {}
        }
    }

    Ok(summary)
}

/// State shared by the two directions of one session.
struct Session<'a> {
    config: &'a RelayConfig,
    /// Triggered when either direction fails for real.
    abort: Shutdown,
    started: Instant,
    /// Milliseconds since `started` at which bytes last moved.
    last_activity_ms: AtomicU64,
}

impl<'a> Session<'a> {
    fn new(config: &'a RelayConfig) -> Self {
        Self {
            config,
            abort: Shutdown::new(),
            started: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(now, Ordering::Relaxed);
    }

    fn idle_deadline(&self, limit: Duration) -> Instant {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.started + last + limit
    }

    /// Read once, failing with `TimedOut` when the whole session has been
    /// idle for longer than the configured limit.
    async fn read<R>(&self, reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let Some(limit) = self.config.idle_timeout else {
            return reader.read(buf).await;
        };

        loop {
            match timeout_at(self.idle_deadline(limit), reader.read(buf)).await {
                Ok(result) => return result,
                // The other direction moved bytes meanwhile; wait again.
                Err(_) if self.idle_deadline(limit) > Instant::now() => continue,
                Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "idle timeout")),
            }
        }
    }
}

/// Result of one copy direction.
struct Leg {
    bytes: u64,
    error: Option<io::Error>,
}

enum Stop {
    Eof,
    Aborted,
    Failed(io::Error),
}

async fn copy_half<R, W>(reader: &mut R, writer: &mut W, session: &Session<'_>) -> Leg
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; session.config.buffer_size.max(1)];
    let mut bytes = 0u64;
    let mut aborted = session.abort.subscribe();

    let stop = loop {
        let read = tokio::select! {
            biased;
            _ = aborted.recv() => break Stop::Aborted,
            read = session.read(reader, &mut buf) => read,
        };
        let n = match read {
            Ok(0) => break Stop::Eof,
            Ok(n) => n,
            Err(e) => break Stop::Failed(e),
        };

        let written = tokio::select! {
            biased;
            _ = aborted.recv() => break Stop::Aborted,
            written = writer.write_all(&buf[..n]) => written,
        };
        if let Err(e) = written {
            break Stop::Failed(e);
        }
        bytes += n as u64;
        session.touch();
    };

    if let Stop::Failed(e) = &stop {
        if !is_session_end(e) {
            session.abort.trigger();
        }
    }

    // Half-close even on failure so the opposite direction's peer sees EOF.
    let shutdown = writer.shutdown().await;

    let error = match stop {
        Stop::Failed(e) => Some(e),
        Stop::Eof => shutdown.err(),
        Stop::Aborted => None,
    };
    Leg { bytes, error }
}

/// Errors that mean the other side of the session has gone away.
fn is_session_end(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
