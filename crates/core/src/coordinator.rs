//! Per-attempt exam coordinator.
//!
//! Composes the session reducer, flush gate, countdown and violation monitor.
//! Every input is synchronous and returns the [`Effect`]s the caller must
//! carry out; network completions come back through `batch_*` / `finish_*`.

use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LockReason, SessionError};
use crate::flush::{FlushGate, FlushPolicy, ForceReason, GateDecision};
use crate::model::{
    AnswerBatchRequest, AnswerBatchResult, AnswerOption, AnswerRecord, AttemptId, ExamStart,
    FinishRequest, FinishResult, Item,
};
use crate::policy::ExamPolicy;
use crate::proctor::{
    EnvironmentSignal, FullscreenSignal, ProctorOutcome, ViolationKind, ViolationMonitor,
    ViolationWarning,
};
use crate::session::{Ability, SessionAction, SessionPhase, SessionState, reduce};
use crate::time::Clock;
use crate::timer::{ExamTimer, TimerTick};

//
// ─── EFFECTS ───────────────────────────────────────────────────────────────────
//

/// Work the coordinator hands back to its driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send the batch, then report with `batch_succeeded` or `batch_failed`.
    SubmitBatch(AnswerBatchRequest),
    /// Finalize, then report with `finish_succeeded` or `finish_failed`.
    Finish(FinishRequest),
    /// Show (or keep showing) a blocking violation dialog.
    Warning(ViolationWarning),
    WarningCleared,
    Terminated(ViolationKind),
    TimeUp,
    Completed(FinishResult),
}

//
// ─── VIEW ──────────────────────────────────────────────────────────────────────
//

/// Presentation snapshot. No formatting, no localization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExamView {
    pub attempt_id: Option<AttemptId>,
    pub phase: SessionPhase,
    pub current: Option<Item>,
    pub question_number: Option<u32>,
    pub is_last_question: bool,
    pub remaining_inventory: usize,
    pub buffered: usize,
    pub ability: Option<Ability>,
    pub seconds_remaining: u64,
    pub timer_paused: bool,
    pub violations: u32,
    pub max_violations: u32,
    pub warning: Option<ViolationWarning>,
    pub error: Option<String>,
    pub flushing: bool,
    pub interaction_locked: bool,
    pub timed_out: bool,
    pub result: Option<FinishResult>,
}

//
// ─── COORDINATOR ───────────────────────────────────────────────────────────────
//

pub struct ExamCoordinator {
    policy: ExamPolicy,
    flush_policy: FlushPolicy,
    clock: Clock,
    state: SessionState,
    timer: ExamTimer,
    monitor: ViolationMonitor,
    gate: FlushGate,
    auto_finish_latched: bool,
    finish_in_flight: bool,
    drain: Option<ForceReason>,
    timed_out: bool,
    error: Option<String>,
    result: Option<FinishResult>,
}

impl ExamCoordinator {
    #[must_use]
    pub fn new(policy: ExamPolicy, clock: Clock) -> Self {
        Self {
            flush_policy: FlushPolicy::new(&policy),
            monitor: ViolationMonitor::new(policy.max_violations()),
            policy,
            clock,
            state: SessionState::default(),
            timer: ExamTimer::default(),
            gate: FlushGate::default(),
            auto_finish_latched: false,
            finish_in_flight: false,
            drain: None,
            timed_out: false,
            error: None,
            result: None,
        }
    }

    /// Opens the session from a start payload and starts the countdown.
    ///
    /// Repeating the call for the attempt already loaded does nothing, so a
    /// duplicate mount cannot restart the timer or reset strikes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StartPayload` if the payload fails validation.
    pub fn initialize(&mut self, start: ExamStart) -> Result<Vec<Effect>, SessionError> {
        if self.state.attempt_id() == Some(start.exam_attempt_id) {
            debug!("attempt {} already initialized", start.exam_attempt_id);
            return Ok(Vec::new());
        }
        start.validate()?;

        let attempt_id = start.exam_attempt_id;
        let served = start.question_inventory.len();
        self.dispatch(SessionAction::Initialize(start));
        self.timer = ExamTimer::default();
        self.timer.start(self.policy.duration_secs());
        self.monitor = ViolationMonitor::new(self.policy.max_violations());
        self.gate = FlushGate::default();
        self.auto_finish_latched = false;
        self.finish_in_flight = false;
        self.drain = None;
        self.timed_out = false;
        self.error = None;
        self.result = None;
        info!("attempt {attempt_id} started with {served} items");

        let mut effects = Vec::new();
        self.check_auto_finish(&mut effects);
        Ok(effects)
    }

    /// Records the user's choice for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` when the session is not accepting answers.
    pub fn answer(
        &mut self,
        option: AnswerOption,
        response_time_ms: u64,
    ) -> Result<Vec<Effect>, SessionError> {
        self.ensure_interactive()?;
        if self.state.current().is_none() {
            return Err(SessionError::NoCurrentQuestion);
        }

        self.dispatch(SessionAction::RecordAnswer {
            option,
            response_time_ms,
            answered_at: self.clock.now(),
        });

        let mut effects = Vec::new();
        let forced = self.flush_policy.forced_reason(&self.state);
        if let Some(reason) = forced {
            debug!("answer forces a flush: {reason:?}");
        }
        self.request_flush(forced.is_some(), &mut effects);
        self.check_auto_finish(&mut effects);
        Ok(effects)
    }

    /// Merges an acknowledged batch and evicts exactly the answers it carried.
    pub fn batch_succeeded(
        &mut self,
        sent: &AnswerBatchRequest,
        result: AnswerBatchResult,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state.attempt_id() != Some(sent.exam_attempt_id) {
            debug!("dropping batch result for stale attempt {}", sent.exam_attempt_id);
            return effects;
        }
        info!(
            "batch of {} acknowledged: position {}, stop {}",
            sent.answers.len(),
            result.position,
            result.stop
        );
        self.dispatch(SessionAction::ApplyBatchResult(result));
        self.dispatch(SessionAction::ClearFlushed(
            sent.answers.iter().map(AnswerRecord::key).collect(),
        ));
        self.settle_flush(false, &mut effects);
        effects
    }

    /// Records a failed flush. The answers stay queued for the next trigger.
    ///
    /// A failed drain behind a user submit cancels that finish and leaves the
    /// exam active so the answers can be retried; time-up and violation
    /// endings finish regardless.
    pub fn batch_failed(
        &mut self,
        sent: &AnswerBatchRequest,
        message: impl Into<String>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state.attempt_id() != Some(sent.exam_attempt_id) {
            debug!("dropping batch failure for stale attempt {}", sent.exam_attempt_id);
            return effects;
        }
        let message = message.into();
        warn!("answer batch failed: {message}");
        self.error = Some(message);
        self.settle_flush(true, &mut effects);
        effects
    }

    pub fn finish_succeeded(&mut self, result: FinishResult) -> Vec<Effect> {
        if !self.finish_in_flight {
            debug!("ignoring finish result with no finish outstanding");
            return Vec::new();
        }
        self.finish_in_flight = false;
        self.dispatch(SessionAction::MarkComplete);
        self.timer.stop();
        info!("attempt finished at {}", result.completed_at);
        self.result = Some(result.clone());
        vec![Effect::Completed(result)]
    }

    pub fn finish_failed(&mut self, message: impl Into<String>) -> Vec<Effect> {
        if !self.finish_in_flight {
            return Vec::new();
        }
        let message = message.into();
        warn!("finish failed: {message}");
        self.finish_in_flight = false;
        self.dispatch(SessionAction::FinishFailed);
        self.error = Some(message);
        Vec::new()
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.timer.tick() == TimerTick::Expired {
            info!("exam time is up");
            self.timed_out = true;
            effects.push(Effect::TimeUp);
            self.drain_then_finish(ForceReason::TimeUp, &mut effects);
        }
        effects
    }

    pub fn environment(&mut self, signal: EnvironmentSignal) -> Vec<Effect> {
        let active = self.state.phase() == SessionPhase::Active;
        let outcome = match signal {
            EnvironmentSignal::Focus(focus) if focus.is_loss() => self.monitor.focus_lost(active),
            EnvironmentSignal::Focus(_) => self.monitor.focus_regained(),
            EnvironmentSignal::Fullscreen(FullscreenSignal::Entered) => {
                self.monitor.fullscreen_changed(true, active)
            }
            EnvironmentSignal::Fullscreen(FullscreenSignal::Exited) => {
                self.monitor.fullscreen_changed(false, active)
            }
            EnvironmentSignal::Fullscreen(FullscreenSignal::Denied) => {
                self.monitor.fullscreen_denied(active)
            }
        };
        self.apply_proctor(outcome)
    }

    /// Safety poll for browsers that drop fullscreen change events.
    pub fn poll_fullscreen(&mut self, in_fullscreen: bool) -> Vec<Effect> {
        let active = self.state.phase() == SessionPhase::Active;
        let outcome = self.monitor.fullscreen_changed(in_fullscreen, active);
        self.apply_proctor(outcome)
    }

    /// User-initiated submit: flush what is buffered, then finish.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` before initialization or after completion.
    pub fn request_finish(&mut self) -> Result<Vec<Effect>, SessionError> {
        match self.state.phase() {
            SessionPhase::Uninitialized => return Err(SessionError::Uninitialized),
            SessionPhase::Complete => return Err(SessionError::Completed),
            SessionPhase::Active | SessionPhase::Finishing => {}
        }
        let mut effects = Vec::new();
        self.drain_then_finish(ForceReason::Submitted, &mut effects);
        Ok(effects)
    }

    /// Resends buffered answers after a failure.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` before initialization or after completion.
    pub fn retry_flush(&mut self) -> Result<Vec<Effect>, SessionError> {
        match self.state.phase() {
            SessionPhase::Uninitialized => return Err(SessionError::Uninitialized),
            SessionPhase::Complete => return Err(SessionError::Completed),
            SessionPhase::Active | SessionPhase::Finishing => {}
        }
        debug!("retrying flush: {:?}", ForceReason::Retry);
        let mut effects = Vec::new();
        self.request_flush(true, &mut effects);
        self.check_auto_finish(&mut effects);
        Ok(effects)
    }

    /// # Errors
    ///
    /// Returns `SessionError::ViolationUnresolved` until the condition is fixed.
    pub fn dismiss_warning(&mut self) -> Result<(), SessionError> {
        self.monitor.dismiss_warning()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn timer(&self) -> &ExamTimer {
        &self.timer
    }

    #[must_use]
    pub fn monitor(&self) -> &ViolationMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn policy(&self) -> &ExamPolicy {
        &self.policy
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn result(&self) -> Option<&FinishResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.gate.is_in_flight()
    }

    #[must_use]
    pub fn is_finishing(&self) -> bool {
        self.finish_in_flight
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Lets tests and drivers move a fixed clock between answers.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    #[must_use]
    pub fn view(&self) -> ExamView {
        ExamView {
            attempt_id: self.state.attempt_id(),
            phase: self.state.phase(),
            current: self.state.current().cloned(),
            question_number: self.state.question_number(),
            is_last_question: self.state.is_last_question(),
            remaining_inventory: self.state.remaining_inventory(),
            buffered: self.state.buffered(),
            ability: self.state.ability(),
            seconds_remaining: self.timer.remaining(),
            timer_paused: self.timer.is_paused(),
            violations: self.monitor.count(),
            max_violations: self.monitor.max(),
            warning: self.monitor.warning(),
            error: self.error.clone(),
            flushing: self.gate.is_in_flight(),
            interaction_locked: self.ensure_interactive().is_err(),
            timed_out: self.timed_out,
            result: self.result.clone(),
        }
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn dispatch(&mut self, action: SessionAction) {
        self.state = reduce(std::mem::take(&mut self.state), action);
    }

    fn ensure_interactive(&self) -> Result<(), SessionError> {
        match self.state.phase() {
            SessionPhase::Uninitialized => Err(SessionError::Uninitialized),
            SessionPhase::Complete => Err(SessionError::Completed),
            SessionPhase::Finishing => Err(SessionError::InteractionLocked(LockReason::Finishing)),
            SessionPhase::Active => {
                if self.drain.is_some() || self.timed_out || self.monitor.is_terminated() {
                    Err(SessionError::InteractionLocked(LockReason::Finishing))
                } else if self.monitor.is_blocking() {
                    Err(SessionError::InteractionLocked(LockReason::Violation))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn request_flush(&mut self, force: bool, effects: &mut Vec<Effect>) {
        match self.gate.request(force) {
            GateDecision::Coalesced => debug!("flush in flight; coalesced (force={force})"),
            GateDecision::Proceed => {
                self.start_flush(force, effects);
            }
        }
    }

    /// Builds the batch from the state as it is now. Returns whether a batch
    /// was emitted.
    fn start_flush(&mut self, force: bool, effects: &mut Vec<Effect>) -> bool {
        let buffered = self.state.buffered();
        let remaining = self.state.remaining_inventory();
        if !self.flush_policy.should_flush(buffered, remaining, force) {
            return false;
        }
        let Some(attempt_id) = self.state.attempt_id() else {
            return false;
        };

        let request = AnswerBatchRequest {
            exam_attempt_id: attempt_id,
            answers: self.state.answered().to_vec(),
            batch_size: self.policy.batch_size(),
            learning_rate: self.state.learning_rate(),
            current_position: self.state.flush_position(),
            idempotency_key: Uuid::new_v4(),
        };
        self.gate.begin();
        self.error = None;
        info!(
            "flushing {buffered} answers for attempt {attempt_id} (force={force}, position {})",
            request.current_position
        );
        effects.push(Effect::SubmitBatch(request));
        true
    }

    fn settle_flush(&mut self, failed: bool, effects: &mut Vec<Effect>) {
        if let Some(force) = self.gate.settle() {
            debug!("replaying coalesced flush (force={force})");
            self.start_flush(force, effects);
        }
        if !self.gate.is_in_flight() {
            match self.drain.take() {
                Some(reason) if failed && !reason.finishes_despite_failure() => {
                    info!("finish held back: {} answers still unsent", self.state.buffered());
                }
                Some(_) => self.begin_finish(effects),
                None => {}
            }
        }
        self.check_auto_finish(effects);
    }

    fn drain_then_finish(&mut self, reason: ForceReason, effects: &mut Vec<Effect>) {
        if self.state.is_complete() || self.finish_in_flight {
            return;
        }
        // A pending time-up or violation drain is never downgraded.
        let reason = match self.drain {
            Some(pending) if pending.finishes_despite_failure() => pending,
            _ => reason,
        };
        debug!("draining answers before finish: {reason:?}");
        self.drain = Some(reason);
        if self.gate.is_in_flight() {
            self.gate.request(true);
            return;
        }
        if self.start_flush(true, effects) {
            return;
        }
        self.drain = None;
        self.begin_finish(effects);
    }

    fn begin_finish(&mut self, effects: &mut Vec<Effect>) {
        if self.finish_in_flight || self.state.is_complete() {
            return;
        }
        let Some(attempt_id) = self.state.attempt_id() else {
            return;
        };
        self.finish_in_flight = true;
        self.dispatch(SessionAction::BeginFinish);
        info!("finishing attempt {attempt_id}");
        effects.push(Effect::Finish(FinishRequest {
            exam_attempt_id: attempt_id,
        }));
    }

    /// One-shot: fires at most once per attempt.
    fn check_auto_finish(&mut self, effects: &mut Vec<Effect>) {
        if self.auto_finish_latched || self.finish_in_flight || self.gate.is_in_flight() {
            return;
        }
        if self.state.ready_to_finalize() {
            self.auto_finish_latched = true;
            self.begin_finish(effects);
        }
    }

    fn apply_proctor(&mut self, outcome: ProctorOutcome) -> Vec<Effect> {
        let mut effects = Vec::new();
        match outcome {
            ProctorOutcome::Ignored | ProctorOutcome::Held(_) => {}
            ProctorOutcome::Warned(warning) => {
                warn!(
                    "{:?} violation {} of {}",
                    warning.kind, warning.count, warning.max
                );
                effects.push(Effect::Warning(warning));
            }
            ProctorOutcome::Remedied { kind, warning } => {
                debug!("{kind:?} violation remedied");
                effects.push(warning.map_or(Effect::WarningCleared, Effect::Warning));
            }
            ProctorOutcome::Terminated(kind) => {
                warn!("{kind:?} violation limit reached; submitting exam");
                self.timer.stop();
                effects.push(Effect::Terminated(kind));
                self.drain_then_finish(ForceReason::ViolationLimit, &mut effects);
            }
        }
        if self.monitor.is_tab_away() && !self.monitor.is_terminated() {
            self.timer.pause();
        } else {
            self.timer.resume();
        }
        effects
    }
}

impl std::fmt::Debug for ExamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamCoordinator")
            .field("attempt_id", &self.state.attempt_id())
            .field("phase", &self.state.phase())
            .field("buffered", &self.state.buffered())
            .field("remaining", &self.timer.remaining())
            .field("violations", &self.monitor.count())
            .field("flushing", &self.gate.is_in_flight())
            .field("finishing", &self.finish_in_flight)
            .field("drain", &self.drain)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
