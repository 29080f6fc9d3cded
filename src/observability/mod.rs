// Observability: Prometheus metrics grouped by pipeline phase

pub mod metrics;

pub use metrics::{init, render, MetricName};
