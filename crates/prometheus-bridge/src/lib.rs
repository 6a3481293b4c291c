pub mod metrics;

pub use metrics::{EvictionReason, GuardMetrics};
