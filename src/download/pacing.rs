//! Randomized pacing between image requests.
//!
//! Every download task sleeps for a random, uniformly distributed interval
//! before its own request. With several tasks running at once this spreads
//! requests out instead of hitting the origin server in a burst.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use image_downloader_core::download::Pacer;
//!
//! # async fn example() {
//! let pacer = Arc::new(Pacer::new(Duration::from_millis(500), Duration::from_millis(1500)));
//! let waited = pacer.pause().await;
//! assert!(waited >= Duration::from_millis(500));
//! # }
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument, warn};

use super::constants::{DEFAULT_PACING_MAX, DEFAULT_PACING_MIN, MAX_RETRY_AFTER};

/// Source of randomized delays inserted before each image request.
///
/// `Pacer` is `Send + Sync` and meant to be shared behind an `Arc`. The RNG
/// can be seeded so that tests observe a reproducible delay sequence.
#[derive(Debug)]
pub struct Pacer {
    min: Duration,
    max: Duration,
    disabled: bool,
    rng: Mutex<StdRng>,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(DEFAULT_PACING_MIN, DEFAULT_PACING_MAX)
    }
}

impl Pacer {
    /// Creates a pacer drawing delays uniformly from `[min, max]`.
    ///
    /// Bounds given in the wrong order are swapped.
    #[must_use]
    #[instrument(skip_all, fields(min_ms = min.as_millis(), max_ms = max.as_millis()))]
    pub fn new(min: Duration, max: Duration) -> Self {
        debug!("creating pacer");
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    /// Creates a pacer with a fixed RNG seed.
    #[must_use]
    pub fn seeded(min: Duration, max: Duration, seed: u64) -> Self {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    /// Creates a pacer that never sleeps.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
            disabled: true,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    fn with_rng(min: Duration, max: Duration, rng: StdRng) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            disabled: false,
            rng: Mutex::new(rng),
        }
    }

    /// Whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Lower bound of the delay interval.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound of the delay interval.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draws the next delay without sleeping.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_delay(&self) -> Duration {
        if self.disabled || self.max.is_zero() {
            return Duration::ZERO;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }

    /// Sleeps for the next delay and returns how long it slept.
    pub async fn pause(&self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "pacing before request");
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use image_downloader_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        // Date already passed
        Err(_) => Some(Duration::ZERO),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_pacer_default_bounds() {
        let pacer = Pacer::default();
        assert_eq!(pacer.min(), Duration::from_millis(500));
        assert_eq!(pacer.max(), Duration::from_millis(1500));
        assert!(!pacer.is_disabled());
    }

    #[test]
    fn test_pacer_delays_within_bounds() {
        let pacer = Pacer::new(Duration::from_millis(100), Duration::from_millis(200));
        for _ in 0..200 {
            let delay = pacer.next_delay();
            assert!(delay >= Duration::from_millis(100), "too short: {delay:?}");
            assert!(delay <= Duration::from_millis(200), "too long: {delay:?}");
        }
    }

    #[test]
    fn test_pacer_swaps_reversed_bounds() {
        let pacer = Pacer::new(Duration::from_millis(900), Duration::from_millis(300));
        assert_eq!(pacer.min(), Duration::from_millis(300));
        assert_eq!(pacer.max(), Duration::from_millis(900));
    }

    #[test]
    fn test_seeded_pacers_produce_identical_sequences() {
        let a = Pacer::seeded(Duration::from_millis(0), Duration::from_millis(1000), 42);
        let b = Pacer::seeded(Duration::from_millis(0), Duration::from_millis(1000), 42);
        let seq_a: Vec<_> = (0..10).map(|_| a.next_delay()).collect();
        let seq_b: Vec<_> = (0..10).map(|_| b.next_delay()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn test_fixed_interval_when_bounds_equal() {
        let pacer = Pacer::new(Duration::from_millis(250), Duration::from_millis(250));
        assert_eq!(pacer.next_delay(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_disabled_pacer_does_not_sleep() {
        tokio::time::pause();
        let pacer = Pacer::disabled();
        let start = Instant::now();
        assert_eq!(pacer.pause().await, Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_pause_sleeps_for_drawn_delay() {
        tokio::time::pause();
        let pacer = Pacer::new(Duration::from_secs(1), Duration::from_secs(2));
        let start = Instant::now();
        let waited = pacer.pause().await;
        assert!(waited >= Duration::from_secs(1));
        assert!(start.elapsed() >= waited);
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_negative_and_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_excessive_values() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }
}
