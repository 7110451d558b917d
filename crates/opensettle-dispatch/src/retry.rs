//! Backoff schedule for settlement retries.

use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// capped at `max`. Saturates instead of overflowing for absurd attempt
/// counts.
#[must_use]
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_millis(5000);

    #[test]
    fn first_retry_waits_base() {
        assert_eq!(backoff_delay(BASE, MAX, 1), Duration::from_millis(100));
    }

    #[test]
    fn doubles_each_attempt() {
        assert_eq!(backoff_delay(BASE, MAX, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(BASE, MAX, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(BASE, MAX, 4), Duration::from_millis(800));
    }

    #[test]
    fn caps_at_max() {
        assert_eq!(backoff_delay(BASE, MAX, 7), MAX);
        assert_eq!(backoff_delay(BASE, MAX, 20), MAX);
    }

    #[test]
    fn survives_absurd_attempt_numbers() {
        assert_eq!(backoff_delay(BASE, MAX, u32::MAX), MAX);
    }

    #[test]
    fn zero_attempt_treated_as_first() {
        assert_eq!(backoff_delay(BASE, MAX, 0), BASE);
    }
}
