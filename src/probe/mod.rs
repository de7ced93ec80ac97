pub mod conn;
pub mod latency;
pub mod throughput;

#[cfg(test)]
pub mod testutil;

pub use latency::{LatencyProber, LatencyStats};
pub use throughput::ThroughputProber;
