//! [`LogThrottle`] – keeps a failing collaborator from flooding the log.
//!
//! The loop runs at frame rate; a sink that is down would otherwise produce
//! one warning per frame.  The throttle lets one warning through per period
//! and counts what it swallowed so the next warning can report it.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

pub struct LogThrottle {
    limiter: DefaultDirectRateLimiter,
    suppressed: u64,
}

impl LogThrottle {
    /// At most `per_second` warnings per second.
    pub fn per_second(per_second: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            suppressed: 0,
        }
    }

    /// Returns `Some(n)` when a warning may be logged now, where `n` is the
    /// number of warnings dropped since the last one that went through.
    pub fn admit(&mut self) -> Option<u64> {
        match self.limiter.check() {
            Ok(()) => Some(std::mem::take(&mut self.suppressed)),
            Err(_) => {
                self.suppressed += 1;
                None
            }
        }
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

impl Default for LogThrottle {
    /// One warning per second.
    fn default() -> Self {
        Self::per_second(NonZeroU32::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_warning_passes_then_burst_is_suppressed() {
        let mut throttle = LogThrottle::default();
        assert_eq!(throttle.admit(), Some(0));
        for _ in 0..5 {
            assert_eq!(throttle.admit(), None);
        }
        assert_eq!(throttle.suppressed(), 5);
    }

    #[test]
    fn suppressed_count_is_reported_and_reset() {
        let mut throttle = LogThrottle::default();
        throttle.admit();
        throttle.admit();
        throttle.admit();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(throttle.admit(), Some(2));
        assert_eq!(throttle.suppressed(), 0);
    }
}
