//! Time source for artifact timestamps.

use chrono::{DateTime, Utc};

/// Where "now" comes from when an artifact is stamped.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the instant it was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockClock {
    at: DateTime<Utc>,
}

impl MockClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_system_clock_is_wall_time() {
        let before = Utc::now();
        let stamped = SystemClock.now_utc();

        assert!(stamped >= before);
        assert!(stamped <= Utc::now());
    }

    #[test]
    fn test_mock_clock_is_frozen() {
        let at = Utc.with_ymd_and_hms(2011, 12, 31, 7, 52, 0).unwrap();
        let clock = MockClock::new(at);

        assert_eq!(clock.now_utc(), at);
        assert_eq!(clock.now_utc(), clock.now_utc());
    }
}
