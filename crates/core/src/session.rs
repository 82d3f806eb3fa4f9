//! Exam progress as a pure reducer.
//!
//! `reduce` is total: an action that does not apply to the current state
//! returns the state unchanged. Side effects (network, timers) live in
//! [`crate::coordinator`].

use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};

use crate::model::{
    AnswerBatchResult, AnswerKey, AnswerOption, AnswerRecord, AttemptId, ExamStart, Item,
};

const INITIAL_LEARNING_RATE: f64 = 0.5;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Active,
    Finishing,
    Complete,
}

/// Ability snapshot returned by the scoring backend. Opaque to this crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ability {
    pub theta: f64,
    pub se: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    phase: SessionPhase,
    attempt_id: Option<AttemptId>,
    pilot_start: u32,
    ability: Option<Ability>,
    learning_rate: f64,
    position: u32,
    current: Option<Item>,
    pending: VecDeque<Item>,
    answered: Vec<AnswerRecord>,
    stop: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            attempt_id: None,
            pilot_start: 0,
            ability: None,
            learning_rate: INITIAL_LEARNING_RATE,
            position: 0,
            current: None,
            pending: VecDeque::new(),
            answered: Vec::new(),
            stop: false,
        }
    }
}

impl SessionState {
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt_id
    }

    #[must_use]
    pub fn pilot_start(&self) -> u32 {
        self.pilot_start
    }

    #[must_use]
    pub fn ability(&self) -> Option<Ability> {
        self.ability
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub fn current(&self) -> Option<&Item> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn pending(&self) -> &VecDeque<Item> {
        &self.pending
    }

    /// Answers recorded locally and not yet acknowledged by the backend.
    #[must_use]
    pub fn answered(&self) -> &[AnswerRecord] {
        &self.answered
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.answered.len()
    }

    #[must_use]
    pub fn stop(&self) -> bool {
        self.stop
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == SessionPhase::Complete
    }

    /// Questions still available locally: the current one plus the queue.
    #[must_use]
    pub fn remaining_inventory(&self) -> usize {
        usize::from(self.current.is_some()) + self.pending.len()
    }

    /// High-water mark of every position known locally.
    #[must_use]
    pub fn flush_position(&self) -> u32 {
        let current = self.current.as_ref().map_or(0, |item| item.position);
        let queued = self.pending.iter().map(|item| item.position).max().unwrap_or(0);
        self.position.max(current).max(queued)
    }

    /// Number to show above the current question.
    #[must_use]
    pub fn question_number(&self) -> Option<u32> {
        self.current.as_ref().map(|item| {
            if item.position > 0 {
                item.position
            } else {
                self.position + 1
            }
        })
    }

    /// True while the current question is the last one the backend will serve.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current.is_some() && self.stop && self.pending.is_empty()
    }

    /// The unique precondition for automatic finalization.
    #[must_use]
    pub fn ready_to_finalize(&self) -> bool {
        self.phase == SessionPhase::Active
            && self.stop
            && self.current.is_none()
            && self.pending.is_empty()
            && self.answered.is_empty()
    }

    fn enqueue(&mut self, items: &[Item]) {
        self.pending.extend(items.iter().cloned());
        if self.current.is_none() {
            self.current = self.pending.pop_front();
        }
    }
}

//
// ─── ACTIONS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Initialize(ExamStart),
    RecordAnswer {
        option: AnswerOption,
        response_time_ms: u64,
        answered_at: DateTime<Utc>,
    },
    ApplyBatchResult(AnswerBatchResult),
    ClearFlushed(Vec<AnswerKey>),
    BeginFinish,
    FinishFailed,
    MarkComplete,
}

//
// ─── REDUCER ───────────────────────────────────────────────────────────────────
//

/// Applies one action to the session state.
#[must_use]
pub fn reduce(mut state: SessionState, action: SessionAction) -> SessionState {
    match action {
        SessionAction::Initialize(start) => {
            if state.attempt_id == Some(start.exam_attempt_id) {
                return state;
            }
            let mut pending: VecDeque<Item> = start.question_inventory.into();
            let current = pending.pop_front();
            let stop = current.is_none();
            SessionState {
                phase: SessionPhase::Active,
                attempt_id: Some(start.exam_attempt_id),
                pilot_start: start.pilot_start_pos,
                ability: Some(Ability {
                    theta: start.theta,
                    se: start.se_theta,
                }),
                learning_rate: start.learning_rate,
                position: 0,
                current,
                pending,
                answered: Vec::new(),
                stop,
            }
        }
        SessionAction::RecordAnswer {
            option,
            response_time_ms,
            answered_at,
        } => {
            if state.phase != SessionPhase::Active {
                return state;
            }
            let Some(item) = state.current.take() else {
                return state;
            };
            state.answered.push(AnswerRecord::stamp(
                item.id,
                option,
                response_time_ms,
                answered_at,
            ));
            state.position += 1;
            state.current = state.pending.pop_front();
            state
        }
        SessionAction::ApplyBatchResult(result) => {
            let live = matches!(state.phase, SessionPhase::Active | SessionPhase::Finishing);
            if !live || state.attempt_id != Some(result.exam_attempt_id) {
                return state;
            }
            state.ability = Some(Ability {
                theta: result.theta,
                se: result.se,
            });
            state.learning_rate = result.learning_rate;
            state.position = result.position;
            state.stop = result.stop;
            state.enqueue(result.delivered());
            state
        }
        SessionAction::ClearFlushed(keys) => {
            if keys.is_empty() || state.answered.is_empty() {
                return state;
            }
            let acknowledged: HashSet<AnswerKey> = keys.into_iter().collect();
            state
                .answered
                .retain(|record| !acknowledged.contains(&record.key()));
            state
        }
        SessionAction::BeginFinish => {
            if state.phase == SessionPhase::Active {
                state.phase = SessionPhase::Finishing;
            }
            state
        }
        SessionAction::FinishFailed => {
            if state.phase == SessionPhase::Finishing {
                state.phase = SessionPhase::Active;
            }
            state
        }
        SessionAction::MarkComplete => {
            if state.phase != SessionPhase::Uninitialized {
                state.phase = SessionPhase::Complete;
                state.stop = true;
            }
            state
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
