//! Backoff schedules
//!
//! Two schedules live here: the capped linear backoff used by the wake word
//! session between recognizer restarts, and the exponential retry policy used
//! for response service HTTP calls.

use std::time::{Duration, SystemTime};

/// Restart schedule for the wake word session
///
/// The delay after `n` consecutive errors is `min(base + n * step, cap)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before any error increments are added
    pub base: Duration,
    /// Added per consecutive error
    pub step: Duration,
    /// Upper bound on any computed delay
    pub cap: Duration,
    /// Consecutive errors after which the session stops retrying
    pub max_consecutive_errors: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3),
            step: Duration::from_secs(2),
            cap: Duration::from_secs(10),
            max_consecutive_errors: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before restarting after `errors` consecutive failures
    #[must_use]
    pub fn delay_for(&self, errors: u32) -> Duration {
        self.base
            .saturating_add(self.step.saturating_mul(errors))
            .min(self.cap)
    }

    /// Whether `errors` consecutive failures means the session should give up
    #[must_use]
    pub const fn is_exhausted(&self, errors: u32) -> bool {
        self.max_consecutive_errors > 0 && errors >= self.max_consecutive_errors
    }
}

/// Retry policy for response service calls
///
/// Controls how many times a failed request is retried and how
/// long to wait between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Determine whether an HTTP status and response body indicate a recoverable error.
///
/// Recoverable errors are worth retrying: rate limits (429), server errors (5xx),
/// and certain transient network-level failures surfaced in the body text.
#[must_use]
pub fn is_recoverable(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }

    if (500..600).contains(&status) {
        return true;
    }

    let lower = body.to_lowercase();
    lower.contains("connection reset")
        || lower.contains("timed out")
        || lower.contains("dns error")
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date values are not supported and yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Compute the delay before the next retry attempt.
///
/// When `retry_after` is provided (e.g. from a 429 response), that value is
/// used directly but capped at `policy.max_delay`. Otherwise the delay follows
/// exponential backoff: `min(base_delay * 2^attempt + jitter, max_delay)`.
///
/// Jitter is 0-25% of the computed delay, derived from `SystemTime`.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(ra) = retry_after {
        return ra.min(policy.max_delay);
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    // Scale to 0-25% of the base delay
    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- BackoffPolicy --------------------------------------------------------

    #[test]
    fn three_errors_follow_linear_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(7000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(9000));
    }

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for n in 0..50 {
            let d = policy.delay_for(n);
            assert!(d >= previous, "delay shrank at n={n}");
            assert!(d <= policy.cap, "delay {d:?} exceeds cap at n={n}");
            previous = d;
        }
        assert_eq!(policy.delay_for(4), policy.cap);
    }

    #[test]
    fn backoff_handles_huge_counts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), policy.cap);
    }

    #[test]
    fn exhaustion_threshold() {
        let policy = BackoffPolicy {
            max_consecutive_errors: 3,
            ..BackoffPolicy::default()
        };
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));

        let unlimited = BackoffPolicy {
            max_consecutive_errors: 0,
            ..BackoffPolicy::default()
        };
        assert!(!unlimited.is_exhausted(1000));
    }

    // -- is_recoverable -------------------------------------------------------

    #[test]
    fn recoverable_on_rate_limit_and_server_errors() {
        assert!(is_recoverable(429, ""));
        assert!(is_recoverable(500, ""));
        assert!(is_recoverable(503, ""));
    }

    #[test]
    fn not_recoverable_on_client_errors() {
        assert!(!is_recoverable(400, ""));
        assert!(!is_recoverable(401, ""));
        assert!(!is_recoverable(404, ""));
    }

    #[test]
    fn recoverable_on_transient_body() {
        assert!(is_recoverable(200, "Connection Reset by peer"));
        assert!(is_recoverable(200, "request Timed Out"));
        assert!(!is_recoverable(200, "bad request format"));
    }

    // -- parse_retry_after ----------------------------------------------------

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 2 "), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    // -- delay_for_attempt ----------------------------------------------------

    #[test]
    fn caps_retry_after_at_max_delay() {
        let policy = RetryPolicy::default();
        let d = delay_for_attempt(&policy, 0, Some(Duration::from_secs(60)));
        assert_eq!(d, policy.max_delay);
    }

    #[test]
    fn exponential_growth_within_jitter() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::default()
        };

        let d0 = delay_for_attempt(&policy, 0, None);
        let d2 = delay_for_attempt(&policy, 2, None);
        assert!(d0 >= Duration::from_millis(100) && d0 <= Duration::from_millis(125));
        assert!(d2 >= Duration::from_millis(400) && d2 <= Duration::from_millis(500));
    }
}
