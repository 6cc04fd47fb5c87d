//! Per-connection error taxonomy.
//!
//! None of these are fatal to the process; the listener logs them and moves
//! on. Startup failures are reported through `anyhow` in the binary.

use std::fmt;
use std::io;

use thiserror::Error;

/// Which leg of a relay session an error happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes flowing from the client to the backend.
    ClientToBackend,
    /// Bytes flowing from the backend to the client.
    BackendToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToBackend => f.write_str("client->backend"),
            Direction::BackendToClient => f.write_str("backend->client"),
        }
    }
}

/// A relay leg failed for a reason other than the session ending.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Unexpected I/O failure while copying.
    #[error("relay {direction} failed: {source}")]
    Io {
        /// The failing leg.
        direction: Direction,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// Why a client connection could not be served.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No backend passed its last health probe.
    #[error("all backends are down")]
    AllBackendsDown,

    /// The selected backend refused or timed out the outbound connection.
    #[error("failed to dial backend {addr}: {source}")]
    Dial {
        /// Address that was dialed.
        addr: String,
        /// Connect error, `TimedOut` when the connect timeout expired.
        #[source]
        source: io::Error,
    },

    /// The session was established but copying failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}
