//! Retry timing for failed directory downloads.
//!
//! Failed downloads are retried on a decorrelated-jitter schedule: the
//! delays are randomized (so failing clients don't synchronize) and
//! grow over time on average (so a recovering server isn't trampled).

use rand::Rng;
use std::time::{Duration, SystemTime};

/// Lowest permitted base delay, in milliseconds.
const MIN_LOW_BOUND: u32 = 1000;
/// Highest permitted base delay, in milliseconds.
const MAX_LOW_BOUND: u32 = u32::MAX - 1;
/// Maximum amount to multiply the previous delay by.
const MAX_DELAY_MULT: u32 = 3;

/// State for computing successive retry delays for one download.
#[derive(Clone, Debug)]
pub struct RetryDelay {
    /// The last delay returned, in msec; 0 before the first call.
    last_delay_ms: u32,
    /// The lowest allowable delay, in msec.
    low_bound_ms: u32,
}

impl RetryDelay {
    /// Construct a new RetryDelay with a given base delay in
    /// milliseconds.  Base delays below one second are raised to one
    /// second.
    pub fn from_msec(base_delay_msec: u32) -> Self {
        let low_bound_ms = base_delay_msec.clamp(MIN_LOW_BOUND, MAX_LOW_BOUND);
        RetryDelay {
            last_delay_ms: 0,
            low_bound_ms,
        }
    }

    /// Construct a new RetryDelay from a given base delay.
    pub fn from_duration(d: Duration) -> Self {
        let msec = std::cmp::min(d.as_millis(), u128::from(MAX_LOW_BOUND)) as u32;
        RetryDelay::from_msec(msec)
    }

    /// Return a lower and upper bound for the next delay, in msec,
    /// with `low < high`.
    fn delay_bounds(&self) -> (u32, u32) {
        let low = self.low_bound_ms;
        let high = std::cmp::max(low + 1, self.last_delay_ms.saturating_mul(MAX_DELAY_MULT));
        (low, high)
    }

    /// Return the next delay to be used, according to a given random
    /// number generator.
    pub fn next_delay<R: Rng>(&mut self, rng: &mut R) -> Duration {
        let (low, high) = self.delay_bounds();
        let val = rng.random_range(low..high);
        self.last_delay_ms = val;
        Duration::from_millis(u64::from(val))
    }

    /// Return this RetryDelay to its original state.
    pub fn reset(&mut self) {
        self.last_delay_ms = 0;
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        RetryDelay::from_msec(0)
    }
}

/// Configuration for how often to retry a download, and how many times.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DownloadSchedule {
    /// How many attempts to make before giving up.
    num_attempts: u32,
    /// The delay after the first failure, and a lower bound for later
    /// delays.
    initial_delay: Duration,
}

impl Default for DownloadSchedule {
    fn default() -> Self {
        DownloadSchedule::new(3, Duration::from_millis(1000))
    }
}

impl DownloadSchedule {
    /// Create a new DownloadSchedule.  At least one attempt is always
    /// made.
    pub fn new(attempts: u32, initial_delay: Duration) -> Self {
        DownloadSchedule {
            num_attempts: attempts.max(1),
            initial_delay,
        }
    }

    /// Return the number of attempts to make.
    pub fn n_attempts(&self) -> u32 {
        self.num_attempts
    }

    /// Return a RetryDelay for this configuration.
    pub fn schedule(&self) -> RetryDelay {
        RetryDelay::from_duration(self.initial_delay)
    }
}

/// The retry state for a single pending download.
#[derive(Debug, Clone)]
pub struct DownloadAttempt {
    /// Which numbered attempt comes next (0-based).
    n_attempted: u32,
    /// Delay generator for this download.
    delay: RetryDelay,
    /// Don't retry before this time.
    next_attempt_at: SystemTime,
    /// The schedule this download follows.
    schedule: DownloadSchedule,
}

impl DownloadAttempt {
    /// Create tracking state for a new download that may start at once.
    pub fn new(schedule: DownloadSchedule, now: SystemTime) -> Self {
        DownloadAttempt {
            n_attempted: 0,
            delay: schedule.schedule(),
            next_attempt_at: now,
            schedule,
        }
    }

    /// Return true if this download may be attempted at `now`.
    pub fn ready_at(&self, now: SystemTime) -> bool {
        !self.exhausted() && self.next_attempt_at <= now
    }

    /// Return true if every attempt has been used up.
    pub fn exhausted(&self) -> bool {
        self.n_attempted >= self.schedule.n_attempts()
    }

    /// Record a failed attempt at time `now`; the next attempt is
    /// pushed into the future with backoff.
    pub fn note_failure<R: Rng>(&mut self, now: SystemTime, rng: &mut R) {
        self.n_attempted = self.n_attempted.saturating_add(1);
        self.next_attempt_at = now + self.delay.next_delay(rng);
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::SeedableRng as _;

    #[test]
    fn bounds_grow() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut rd = RetryDelay::from_msec(1000);
        assert_eq!(rd.delay_bounds(), (1000, 1001));
        let d1 = rd.next_delay(&mut rng);
        assert_eq!(d1, Duration::from_millis(1000));

        let (lo, hi) = rd.delay_bounds();
        assert_eq!(lo, 1000);
        assert_eq!(hi, 3000);
        for _ in 0..20 {
            let d = rd.next_delay(&mut rng);
            assert!(d >= Duration::from_millis(1000));
        }

        rd.reset();
        assert_eq!(rd.delay_bounds(), (1000, 1001));
    }

    #[test]
    fn sub_second_base_is_raised() {
        let rd = RetryDelay::from_msec(10);
        assert_eq!(rd.delay_bounds().0, 1000);
        let rd = RetryDelay::from_duration(Duration::from_millis(1500));
        assert_eq!(rd.delay_bounds().0, 1500);
    }

    #[test]
    fn download_attempts_run_out() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(8);
        let schedule = DownloadSchedule::new(2, Duration::from_secs(1));
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut attempt = DownloadAttempt::new(schedule, t0);

        assert!(attempt.ready_at(t0));
        attempt.note_failure(t0, &mut rng);
        assert!(!attempt.ready_at(t0));
        assert!(attempt.ready_at(t0 + Duration::from_secs(10)));

        attempt.note_failure(t0 + Duration::from_secs(10), &mut rng);
        assert!(attempt.exhausted());
        assert!(!attempt.ready_at(t0 + Duration::from_secs(1000)));

        // Zero-attempt schedules still make one attempt.
        assert_eq!(DownloadSchedule::new(0, Duration::from_secs(1)).n_attempts(), 1);
    }
}
