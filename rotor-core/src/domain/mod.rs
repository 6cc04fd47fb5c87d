//! Domain models: backends and the registry that owns them.

pub mod backend;
pub mod registry;
