//! The fixed backend registry and its rotation state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::backend::{Backend, BackendId, SharedBackend};
use crate::error::RegistryError;
use crate::load_balancer::round_robin;

/// An ordered, fixed-size set of backends with a shared round-robin cursor.
///
/// Membership never changes after construction. The only mutable state is the
/// cursor and each backend's liveness flag, both atomics, so selection takes
/// no lock.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<SharedBackend>,
    cursor: AtomicU64,
}

impl BackendRegistry {
    /// Build a registry from an ordered list of `host:port` addresses.
    ///
    /// Every backend starts alive. Fails on an empty list or on an entry that
    /// is not `host:port` with a numeric port.
    pub fn new<I, S>(addrs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backends = addrs
            .into_iter()
            .enumerate()
            .map(|(i, addr)| {
                let addr = addr.into();
                validate_addr(&addr)?;
                Ok(Arc::new(Backend::new(BackendId(i), addr)))
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;

        if backends.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(Self {
            backends,
            cursor: AtomicU64::new(0),
        })
    }

    /// Pick the next alive backend in rotation, or `None` if every backend is down.
    ///
    /// The cursor moves on every call, successful or not, so concurrent callers
    /// start from distinct offsets. When dead backends are stepped over, the
    /// cursor is pushed forward past them so the survivors keep alternating.
    pub fn select(&self) -> Option<SharedBackend> {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        let hit = round_robin::scan(self.backends.len(), start, |i| {
            self.backends[i].is_alive()
        })?;

        if hit.skipped > 0 {
            self.cursor
                .fetch_max(start.wrapping_add(hit.skipped as u64), Ordering::Relaxed);
        }

        Some(Arc::clone(&self.backends[hit.index]))
    }

    /// All backends in registry order (e.g., for the health prober).
    pub fn backends(&self) -> &[SharedBackend] {
        &self.backends
    }

    /// Number of registered backends. Never zero.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Number of backends currently believed alive.
    pub fn alive_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_alive()).count()
    }
}

fn validate_addr(addr: &str) -> Result<(), RegistryError> {
    let invalid = |reason| RegistryError::InvalidAddress {
        addr: addr.to_string(),
        reason,
    };

    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    port.parse::<u16>().map_err(|_| invalid("port is not a number in 0..=65535"))?;
    Ok(())
}

/// A shared reference to the backend registry.
pub type SharedRegistry = Arc<BackendRegistry>;
