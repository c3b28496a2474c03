//! Constants for the download module (timeouts, pacing, size limits).

use std::time::Duration;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout for page and image fetches (15 seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 15;

/// Default timeout for the pre-flight connectivity probe (5 seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Lower bound of the randomized pacing delay before each image request.
pub const DEFAULT_PACING_MIN: Duration = Duration::from_millis(500);

/// Upper bound of the randomized pacing delay before each image request.
pub const DEFAULT_PACING_MAX: Duration = Duration::from_millis(1500);

/// Largest accepted response body (50 MiB).
pub const MAX_BODY_BYTES: u64 = 50 * 1024 * 1024;

/// Quality used when re-encoding to JPEG.
pub const JPEG_QUALITY: u8 = 95;

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);
