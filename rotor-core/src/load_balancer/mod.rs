//! Load balancing primitives.

pub mod round_robin;
