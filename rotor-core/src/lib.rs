//! Rotor Core functionality.
//!
//! This crate contains the backend model, the fixed backend registry, and the
//! liveness-aware round-robin selection that power the Rotor TCP balancer.
//! It has no async runtime dependency; the proxy crate drives it.

pub mod domain;
pub mod error;
pub mod load_balancer;

pub use domain::backend::{Backend, BackendId, SharedBackend};
pub use domain::registry::{BackendRegistry, SharedRegistry};
pub use error::RegistryError;
