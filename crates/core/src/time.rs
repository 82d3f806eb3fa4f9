use chrono::{DateTime, Duration, TimeZone, Utc};

/// Where answer stamps come from.
///
/// `served_at` and `answered_at` are taken from the coordinator's clock, so
/// pinning it makes batch payloads reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }

    /// Steps a pinned clock, e.g. by one question's response time.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(at) = self {
            *at += delta;
        }
    }
}

/// Exam start used across tests: 2024-03-04T09:00:00Z.
///
/// # Panics
///
/// Only if the literal date stops being a valid UTC time.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0)
        .single()
        .expect("literal exam start is a valid UTC time")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::Fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_clock_steps_by_response_time() {
        let mut clock = fixed_clock();
        clock.advance(Duration::milliseconds(4_500));
        assert_eq!(clock.now(), fixed_now() + Duration::milliseconds(4_500));
    }

    #[test]
    fn system_clock_ignores_advance() {
        let mut clock = Clock::default();
        clock.advance(Duration::days(365));
        assert!(matches!(clock, Clock::System));
        assert!(clock.now() > fixed_now());
    }
}
