//! Central configuration constants for runtime limits and defaults.

use std::time::Duration;

/// Period of the elapsed-time ticker while an operation is active.
pub const ELAPSED_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval at which a headless host pumps the UI dispatcher (ms).
pub const DEFAULT_PUMP_INTERVAL_MS: u64 = 50;

/// Minimum allowed pump interval (ms).
pub const MIN_PUMP_INTERVAL_MS: u64 = 10;

/// Maximum allowed pump interval (ms).
pub const MAX_PUMP_INTERVAL_MS: u64 = 1_000;

/// Read buffer used when hashing file contents. 64 KiB.
pub const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Convenience function to clamp a pump interval into allowed range.
pub fn clamp_pump_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_PUMP_INTERVAL_MS, MAX_PUMP_INTERVAL_MS))
}
