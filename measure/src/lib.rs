//! Speedgauge Measurement Library
//!
//! Shared, I/O-free definitions for the speedgauge client.
//! This includes the server model, unit conversion, dial scales, sample
//! history and the finished measurement record with its derived ratings.

pub mod constants;
pub mod dial;
pub mod error;
pub mod geo;
pub mod phase;
pub mod result;
pub mod sample;
pub mod server;
pub mod units;

pub use constants::*;
pub use dial::DialScale;
pub use error::{MeasurementError, ProbeError};
pub use phase::Phase;
pub use result::{MeasurementResult, PingStats};
pub use sample::{SampleHistory, SpeedSample};
pub use server::{BandwidthLimits, Server, ServerStatus};
pub use units::DisplayUnit;

/// Throughput in Mbit/s for `bytes` transferred over `elapsed_secs`
///
/// Returns 0.0 until any time has elapsed.
pub fn throughput_mbps(bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (elapsed_secs * 1_000_000.0)
}
