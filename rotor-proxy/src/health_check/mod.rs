//! Active health checking of backends.

pub mod prober;

pub use prober::{HealthProber, ProbeMode, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT};
