//! Upstream endpoints and their liveness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Index of a backend in registry order; stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendId(pub usize);

/// One upstream TCP endpoint the balancer may route to, plus its last
/// known liveness.
///
/// The address never changes after construction. Only the liveness flag is
/// mutable, and it is written by the prober alone.
#[derive(Debug)]
pub struct Backend {
    /// Slot in the registry rotation.
    pub id: BackendId,
    /// `host:port` string, resolved again on every connect.
    pub addr: String,
    /// Outcome of the most recent connect attempt by the prober.
    alive: AtomicBool,
}

impl Backend {
    /// A fresh backend counts as alive until the first health check round.
    pub fn new(id: BackendId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
            alive: AtomicBool::new(true),
        }
    }

    /// Current liveness. Dispatchers read it without locking, so a value can
    /// be one health check round old.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Record a health check outcome, replacing whatever was there before.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }
}

/// Backends are handed to the registry, the prober and every dispatcher by
/// reference count.
pub type SharedBackend = Arc<Backend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_alive() {
        let backend = Backend::new(BackendId(0), "localhost:8000");
        assert!(backend.is_alive());
        assert_eq!(backend.addr, "localhost:8000");
    }

    #[test]
    fn set_alive_overwrites_unconditionally() {
        let backend = Backend::new(BackendId(3), "10.0.0.1:80");
        backend.set_alive(false);
        backend.set_alive(false);
        assert!(!backend.is_alive());
        backend.set_alive(true);
        assert!(backend.is_alive());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_and_readers_never_block() {
        let backend = Arc::new(Backend::new(BackendId(0), "127.0.0.1:1"));

        let writers: Vec<_> = (0..4)
            .map(|n| {
                let backend = Arc::clone(&backend);
                tokio::spawn(async move {
                    for i in 0..1_000 {
                        backend.set_alive((i + n) % 2 == 0);
                    }
                })
            })
            .collect();

        let reader = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                let mut seen = 0usize;
                for _ in 0..1_000 {
                    if backend.is_alive() {
                        seen += 1;
                    }
                }
                seen
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        assert!(reader.await.unwrap() <= 1_000);
    }
}
