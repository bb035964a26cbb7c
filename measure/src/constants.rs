//! Measurement constants and default tuning values

/// One megabyte as used for chunk sizes (decimal, matches the Mbit/s formula)
pub const MEGABYTE: u64 = 1_000_000;

/// Number of round-trip probes in the ping phase
pub const PING_COUNT: u32 = 10;

/// Per-probe ping timeout (milliseconds)
pub const PING_TIMEOUT_MS: u64 = 5_000;

/// Fixed delay between ping probes (milliseconds)
pub const PING_INTERVAL_MS: u64 = 100;

/// Settle delay spent in the connecting phase (milliseconds)
pub const SETTLE_MS: u64 = 2_000;

/// Wall-clock budget of the download phase (milliseconds)
pub const DOWNLOAD_DURATION_MS: u64 = 10_000;

/// Maximum download probes in flight at once
pub const DOWNLOAD_CONCURRENCY: usize = 3;

/// Download chunk sizes a probe picks from at random
pub const DOWNLOAD_CHUNK_SIZES: [u64; 3] = [MEGABYTE, 2 * MEGABYTE, 5 * MEGABYTE];

/// Per-chunk download timeout (milliseconds)
pub const DOWNLOAD_TIMEOUT_MS: u64 = 30_000;

/// Wall-clock budget of the upload phase (milliseconds)
pub const UPLOAD_DURATION_MS: u64 = 10_000;

/// Size of every upload payload
pub const UPLOAD_CHUNK_SIZE: u64 = MEGABYTE;

/// Per-POST upload timeout (milliseconds)
pub const UPLOAD_TIMEOUT_MS: u64 = 30_000;

/// Consecutive upload failures that abort the phase
pub const UPLOAD_FAILURE_LIMIT: u32 = 3;

/// Pause before re-issuing a probe that just failed (milliseconds)
pub const PROBE_RETRY_DELAY_MS: u64 = 100;

/// Duration of the cosmetic speed decay after the last phase (milliseconds)
pub const DECAY_MS: u64 = 500;

/// Number of decay steps
pub const DECAY_STEPS: u32 = 4;

/// Samples kept per phase for live charts
pub const HISTORY_CAPACITY: usize = 20;

/// Mean earth radius used by the haversine formula (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Placeholder for metadata that could not be resolved
pub const NOT_AVAILABLE: &str = "N/A";
