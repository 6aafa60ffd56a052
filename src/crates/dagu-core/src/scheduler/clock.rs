use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::{Arc, Mutex};

/// Abstracts "what time is it" so the tick loop's truncate-and-advance logic
/// can be driven by a fake clock in tests instead of the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock fixed at a settable instant, advanced explicitly by tests.
#[derive(Clone)]
pub struct FrozenClock {
    at: Arc<Mutex<DateTime<Utc>>>,
}

impl FrozenClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: Arc::new(Mutex::new(at)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut at = self.at.lock().unwrap();
        *at += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock().unwrap() = at;
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap()
    }
}

/// Truncates `at` down to the start of its minute.
pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at - Duration::seconds(at.second() as i64) - Duration::nanoseconds(at.timestamp_subsec_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_drops_seconds_and_sub_second() {
        let at = "2024-01-01T10:30:45.500Z".parse::<DateTime<Utc>>().unwrap();
        let truncated = truncate_to_minute(at);
        assert_eq!(truncated.to_rfc3339(), "2024-01-01T10:30:00+00:00");
    }

    #[test]
    fn frozen_clock_advances_on_demand() {
        let start = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock = FrozenClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(1));
        assert_eq!(clock.now(), start + Duration::minutes(1));
    }
}
