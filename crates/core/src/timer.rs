/// Result of advancing the countdown by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// Stopped or paused; nothing changed.
    Idle,
    Running { remaining: u64 },
    /// Reached zero on this tick. Reported once.
    Expired,
}

/// One-second countdown with pause and resume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExamTimer {
    remaining: u64,
    running: bool,
    paused: bool,
}

impl ExamTimer {
    pub fn start(&mut self, seconds: u64) {
        self.remaining = seconds;
        self.running = true;
        self.paused = false;
    }

    pub fn tick(&mut self) -> TimerTick {
        if !self.running || self.paused {
            return TimerTick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            TimerTick::Expired
        } else {
            TimerTick::Running {
                remaining: self.remaining,
            }
        }
    }

    /// Freezes the countdown without resetting it.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_and_expires_once() {
        let mut timer = ExamTimer::default();
        timer.start(3);
        assert_eq!(timer.tick(), TimerTick::Running { remaining: 2 });
        assert_eq!(timer.tick(), TimerTick::Running { remaining: 1 });
        assert_eq!(timer.tick(), TimerTick::Expired);
        assert_eq!(timer.tick(), TimerTick::Idle);
        assert!(!timer.is_running());
    }

    #[test]
    fn pause_freezes_without_reset() {
        let mut timer = ExamTimer::default();
        timer.start(10);
        timer.tick();
        timer.pause();
        for _ in 0..5 {
            assert_eq!(timer.tick(), TimerTick::Idle);
        }
        assert_eq!(timer.remaining(), 9);
        timer.resume();
        assert_eq!(timer.tick(), TimerTick::Running { remaining: 8 });
    }

    #[test]
    fn stopped_timer_does_not_tick() {
        let mut timer = ExamTimer::default();
        assert_eq!(timer.tick(), TimerTick::Idle);
        timer.start(5);
        timer.stop();
        assert_eq!(timer.tick(), TimerTick::Idle);
        assert_eq!(timer.remaining(), 5);
    }
}
