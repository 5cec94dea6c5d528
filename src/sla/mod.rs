// SLA risk classification: the pure threshold policy and the pull-based
// monitor built on it.

pub mod monitor;
pub mod policy;

pub use monitor::{SlaMonitor, SlaReport};
pub use policy::{SlaPolicy, SlaThresholds, SlaTier, ThresholdError};
