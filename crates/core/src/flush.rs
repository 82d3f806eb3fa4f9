//! When to synchronize the answered queue, and the single in-flight rule.

use crate::policy::ExamPolicy;
use crate::session::SessionState;

/// Why a flush bypasses the batching heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReason {
    /// The backend already said no more items are warranted.
    StopSignaled,
    /// The pending queue is empty after the last answer.
    QueueDrained,
    /// Local inventory is at or below the low-water mark.
    LowInventory,
    /// The user asked to submit the exam.
    Submitted,
    TimeUp,
    ViolationLimit,
    /// The user asked to retry after a failed flush.
    Retry,
}

impl ForceReason {
    /// Whether a finish queued behind this drain goes ahead even when the
    /// drain flush fails.
    #[must_use]
    pub fn finishes_despite_failure(self) -> bool {
        matches!(self, Self::TimeUp | Self::ViolationLimit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    batch_size: usize,
    multiple: usize,
    low_inventory: usize,
}

impl FlushPolicy {
    #[must_use]
    pub fn new(policy: &ExamPolicy) -> Self {
        let to_usize = |v: u32| usize::try_from(v).unwrap_or(usize::MAX);
        Self {
            batch_size: to_usize(policy.batch_size()),
            multiple: to_usize(policy.flush_multiple()).max(1),
            low_inventory: to_usize(policy.low_inventory()),
        }
    }

    /// Whether `buffered` answers should be sent now.
    ///
    /// Forced flushes send whatever is buffered. Otherwise the buffer must be
    /// a positive multiple of the flush multiple and either inventory is
    /// running low or a full batch is waiting.
    #[must_use]
    pub fn should_flush(&self, buffered: usize, remaining: usize, force: bool) -> bool {
        if buffered == 0 {
            return false;
        }
        if force {
            return true;
        }
        buffered % self.multiple == 0
            && (remaining <= self.low_inventory || buffered >= self.batch_size)
    }

    /// Force condition evaluated right after an answer was recorded.
    #[must_use]
    pub fn forced_reason(&self, state: &SessionState) -> Option<ForceReason> {
        if state.stop() {
            Some(ForceReason::StopSignaled)
        } else if state.pending().is_empty() {
            Some(ForceReason::QueueDrained)
        } else if state.remaining_inventory() <= self.low_inventory {
            Some(ForceReason::LowInventory)
        } else {
            None
        }
    }
}

/// Outcome of asking the gate for permission to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// Folded into the replay that fires when the in-flight flush settles.
    Coalesced,
}

/// Single in-flight flush plus one coalesced replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushGate {
    in_flight: bool,
    replay: Option<bool>,
}

impl FlushGate {
    pub fn request(&mut self, force: bool) -> GateDecision {
        if self.in_flight {
            let pending = self.replay.unwrap_or(false);
            self.replay = Some(pending || force);
            GateDecision::Coalesced
        } else {
            GateDecision::Proceed
        }
    }

    pub fn begin(&mut self) {
        self.in_flight = true;
    }

    /// Clears the in-flight flag and hands back the replay's force flag.
    pub fn settle(&mut self) -> Option<bool> {
        self.in_flight = false;
        self.replay.take()
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}
