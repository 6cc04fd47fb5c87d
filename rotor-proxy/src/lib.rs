//! Rotor Proxy Engine
//!
//! The Tokio engine around `rotor-core`: it accepts TCP connections, picks a
//! backend from the shared registry, and relays bytes both ways until the
//! session ends, while a background prober keeps backend liveness current.
//!
//! ```text
//! Client -> Listener -> Dispatcher -> BackendRegistry::select -> dial -> relay <-> Backend
//!                                            ^
//!                              HealthProber (liveness writer)
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health_check;
pub mod logging;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use dispatcher::Dispatcher;
pub use error::{Direction, DispatchError, RelayError};
pub use health_check::{HealthProber, ProbeMode};
pub use relay::{relay, RelayConfig, RelaySummary};
pub use server::Listener;
pub use shutdown::{Shutdown, ShutdownSignal};
