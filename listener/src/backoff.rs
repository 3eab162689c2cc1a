//! Retry pacing for requests whose fulfillment failed.

use sortes_types::Timestamp;

const BACKOFF_FACTOR: f64 = 1.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Backoff {
    pub fn new(initial_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self {
            initial_delay_secs,
            max_delay_secs,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.initial_delay_secs > 0
    }

    /// `min(initial * 1.3^(attempts - 1), max)`, zero before the first try.
    pub fn delay_secs(&self, attempts: u32) -> u64 {
        if !self.is_enabled() || attempts == 0 {
            return 0;
        }
        let exponent = i32::try_from(attempts - 1).unwrap_or(i32::MAX);
        let delay = self.initial_delay_secs as f64 * BACKOFF_FACTOR.powi(exponent);
        // Float-to-int casts saturate, so an infinite delay becomes u64::MAX.
        (delay as u64).min(self.max_delay_secs)
    }

    /// Whether a request tried `attempts` times, last at `last_try`, may
    /// be retried at `now`.
    pub fn may_retry(&self, attempts: u32, last_try: Timestamp, now: Timestamp) -> bool {
        last_try.has_expired(self.delay_secs(attempts), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_backoff_never_waits() {
        let backoff = Backoff::new(0, 3600);
        assert_eq!(backoff.delay_secs(10), 0);
        assert!(backoff.may_retry(10, Timestamp::new(100), Timestamp::new(100)));
    }

    #[test]
    fn first_attempt_never_waits() {
        let backoff = Backoff::new(10, 3600);
        assert_eq!(backoff.delay_secs(0), 0);
    }

    #[test]
    fn delay_grows_geometrically() {
        let backoff = Backoff::new(10, 3600);
        assert_eq!(backoff.delay_secs(1), 10);
        assert_eq!(backoff.delay_secs(2), 13);
        assert_eq!(backoff.delay_secs(3), 16);
    }

    #[test]
    fn delay_is_capped() {
        let backoff = Backoff::new(10, 60);
        assert_eq!(backoff.delay_secs(50), 60);
        assert_eq!(backoff.delay_secs(u32::MAX), 60);
    }

    #[test]
    fn retry_waits_for_delay() {
        let backoff = Backoff::new(10, 3600);
        let last_try = Timestamp::new(1_000);
        assert!(!backoff.may_retry(1, last_try, Timestamp::new(1_009)));
        assert!(backoff.may_retry(1, last_try, Timestamp::new(1_010)));
    }
}
