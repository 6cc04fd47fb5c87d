//! Errors raised while assembling the backend registry.

use thiserror::Error;

/// Reasons a backend list cannot become a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry needs at least one backend to rotate over.
    #[error("backend list is empty")]
    Empty,

    /// An entry is not of the form `host:port`.
    #[error("invalid backend address {addr:?}: {reason}")]
    InvalidAddress {
        /// The rejected entry.
        addr: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}
