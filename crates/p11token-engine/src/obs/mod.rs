//! In-process metrics, rendered in Prometheus text format.

pub mod metrics;

pub use metrics::{CounterVec, GaugeVec, TokenMetrics};
