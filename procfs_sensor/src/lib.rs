//! Per-cgroup CPU usage sensor.
//!
//! Every tick the sensor runs a per-process statistics command, sums CPU usage by
//! configured cgroup ("target") and streams one JSON report over a TCP connection.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod logging;
pub mod membership;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod source;
pub mod transport;

pub use error::{SensorError, TransportError};
