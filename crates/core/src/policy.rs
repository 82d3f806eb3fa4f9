use std::time::Duration;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("exam duration must be at least one second")]
    InvalidDuration,

    #[error("batch size must be > 0")]
    InvalidBatchSize,

    #[error("flush multiple must be > 0 and <= batch size")]
    InvalidFlushMultiple,

    #[error("maximum violations must be > 0")]
    InvalidMaxViolations,

    #[error("fullscreen poll interval must be > 0")]
    InvalidFullscreenPoll,
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Product constants that shape an exam attempt.
///
/// Batching thresholds and the violation limit are business decisions, so
/// they travel as a value instead of being baked into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamPolicy {
    duration: Duration,
    batch_size: u32,
    flush_multiple: u32,
    low_inventory: u32,
    max_violations: u32,
    fullscreen_poll: Duration,
    tick: Duration,
}

impl Default for ExamPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(12_600),
            batch_size: 6,
            flush_multiple: 3,
            low_inventory: 3,
            max_violations: 3,
            fullscreen_poll: Duration::from_secs(2),
            tick: Duration::from_secs(1),
        }
    }
}

impl ExamPolicy {
    /// Builds a policy with the default poll and tick intervals.
    ///
    /// # Errors
    ///
    /// Returns a `PolicyError` naming the first invalid value.
    pub fn new(
        duration: Duration,
        batch_size: u32,
        flush_multiple: u32,
        low_inventory: u32,
        max_violations: u32,
    ) -> Result<Self, PolicyError> {
        let policy = Self {
            duration,
            batch_size,
            flush_multiple,
            low_inventory,
            max_violations,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    /// # Errors
    ///
    /// Returns a `PolicyError` naming the first invalid value.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.duration.as_secs() == 0 {
            return Err(PolicyError::InvalidDuration);
        }
        if self.batch_size == 0 {
            return Err(PolicyError::InvalidBatchSize);
        }
        if self.flush_multiple == 0 || self.flush_multiple > self.batch_size {
            return Err(PolicyError::InvalidFlushMultiple);
        }
        if self.max_violations == 0 {
            return Err(PolicyError::InvalidMaxViolations);
        }
        if self.fullscreen_poll.is_zero() {
            return Err(PolicyError::InvalidFullscreenPoll);
        }
        Ok(())
    }

    /// Overrides the fullscreen safety-poll interval.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidFullscreenPoll` for a zero interval.
    pub fn with_fullscreen_poll(mut self, poll: Duration) -> Result<Self, PolicyError> {
        if poll.is_zero() {
            return Err(PolicyError::InvalidFullscreenPoll);
        }
        self.fullscreen_poll = poll;
        Ok(self)
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Exam length in whole seconds, the timer's resolution.
    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration.as_secs()
    }

    #[must_use]
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    #[must_use]
    pub fn flush_multiple(&self) -> u32 {
        self.flush_multiple
    }

    #[must_use]
    pub fn low_inventory(&self) -> u32 {
        self.low_inventory
    }

    #[must_use]
    pub fn max_violations(&self) -> u32 {
        self.max_violations
    }

    #[must_use]
    pub fn fullscreen_poll(&self) -> Duration {
        self.fullscreen_poll
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }
}
