//! Async driver for one exam attempt.
//!
//! The runner owns the `ExamCoordinator` and is the only place that touches
//! it. Network calls run as tasks in `JoinSet`s and report back through the
//! same loop, so coordinator state never needs a lock.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};

use exam_core::model::{
    AnswerBatchRequest, AnswerBatchResult, AnswerOption, AttemptId, ExamStart, FinishResult,
};
use exam_core::proctor::{EnvironmentSignal, ViolationKind, ViolationWarning};
use exam_core::{Clock, Effect, ExamCoordinator, ExamPolicy, ExamView, SessionError};

use crate::api::ExamApi;
use crate::environment::EnvironmentObserver;
use crate::error::{ApiError, RunnerError};

const COMMAND_BUFFER: usize = 32;

type FlushTasks = JoinSet<Result<AnswerBatchResult, ApiError>>;
type FinishTasks = JoinSet<Result<FinishResult, ApiError>>;

//
// ─── MESSAGES ──────────────────────────────────────────────────────────────────
//

/// User intents forwarded to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamCommand {
    Answer {
        option: AnswerOption,
        response_time_ms: u64,
    },
    DismissWarning,
    RetryFlush,
    Finish,
    ClearError,
}

/// Notifications the presentation layer reacts to once.
#[derive(Debug, Clone, PartialEq)]
pub enum ExamEvent {
    Warning(ViolationWarning),
    WarningCleared,
    Terminated(ViolationKind),
    TimeUp,
    Completed(FinishResult),
    Rejected(SessionError),
}

/// Final result of a submitted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamOutcome {
    pub attempt_id: AttemptId,
    pub result: FinishResult,
    pub violations: u32,
    pub timed_out: bool,
    pub terminated: Option<ViolationKind>,
}

//
// ─── HANDLE ────────────────────────────────────────────────────────────────────
//

/// The presentation side of a running exam.
#[derive(Debug)]
pub struct ExamHandle {
    commands: mpsc::Sender<ExamCommand>,
    view: watch::Receiver<ExamView>,
    events: mpsc::UnboundedReceiver<ExamEvent>,
}

impl ExamHandle {
    /// # Errors
    ///
    /// Returns `RunnerError::Stopped` once the runner has exited.
    pub async fn send(&self, command: ExamCommand) -> Result<(), RunnerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RunnerError::Stopped)
    }

    /// # Errors
    ///
    /// Returns `RunnerError::Stopped` once the runner has exited.
    pub async fn answer(
        &self,
        option: AnswerOption,
        response_time_ms: u64,
    ) -> Result<(), RunnerError> {
        self.send(ExamCommand::Answer {
            option,
            response_time_ms,
        })
        .await
    }

    #[must_use]
    pub fn view(&self) -> ExamView {
        self.view.borrow().clone()
    }

    /// A receiver that wakes on every published view.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ExamView> {
        self.view.clone()
    }

    pub async fn next_event(&mut self) -> Option<ExamEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<ExamEvent> {
        self.events.try_recv().ok()
    }
}

//
// ─── RUNNER ────────────────────────────────────────────────────────────────────
//

pub struct ExamRunner {
    api: Arc<dyn ExamApi>,
    coordinator: ExamCoordinator,
    environment: Box<dyn EnvironmentObserver>,
    commands: mpsc::Receiver<ExamCommand>,
    view: watch::Sender<ExamView>,
    events: mpsc::UnboundedSender<ExamEvent>,
    // The coordinator keeps at most one batch in flight.
    sending: Option<AnswerBatchRequest>,
    terminated: Option<ViolationKind>,
}

impl ExamRunner {
    #[must_use]
    pub fn new(
        api: Arc<dyn ExamApi>,
        policy: ExamPolicy,
        clock: Clock,
        environment: Box<dyn EnvironmentObserver>,
    ) -> (Self, ExamHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view_rx) = watch::channel(ExamView::default());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let runner = Self {
            api,
            coordinator: ExamCoordinator::new(policy, clock),
            environment,
            commands: command_rx,
            view: view_tx,
            events: event_tx,
            sending: None,
            terminated: None,
        };
        let handle = ExamHandle {
            commands: command_tx,
            view: view_rx,
            events: event_rx,
        };
        (runner, handle)
    }

    /// Starts a new attempt on the backend and plays it to completion.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Start` if the attempt cannot be opened, plus
    /// everything `run_with` returns.
    pub async fn run(self) -> Result<ExamOutcome, RunnerError> {
        let start = self.api.start_exam().await?;
        self.run_with(start).await
    }

    /// Plays an already started attempt to completion.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Session` for an invalid start payload and
    /// `RunnerError::Abandoned` if every handle is dropped before the
    /// backend confirms the finish.
    pub async fn run_with(mut self, start: ExamStart) -> Result<ExamOutcome, RunnerError> {
        let mut flushes = FlushTasks::new();
        let mut finishes = FinishTasks::new();
        let (signal_tx, mut signals) = mpsc::unbounded_channel();
        self.observe_environment(signal_tx);

        let effects = self.coordinator.initialize(start)?;
        self.perform(effects, &mut flushes, &mut finishes);
        let fullscreen = self.environment.is_fullscreen();
        let effects = self.coordinator.poll_fullscreen(fullscreen);
        self.perform(effects, &mut flushes, &mut finishes);
        self.publish();

        let policy = self.coordinator.policy().clone();
        let mut ticker = time::interval_at(Instant::now() + policy.tick(), policy.tick());
        let mut poll = time::interval_at(
            Instant::now() + policy.fullscreen_poll(),
            policy.fullscreen_poll(),
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(outcome) = self.outcome() {
                info!("attempt {} submitted", outcome.attempt_id);
                return Ok(outcome);
            }

            let effects = tokio::select! {
                _ = ticker.tick() => self.coordinator.tick(),
                _ = poll.tick() => {
                    let fullscreen = self.environment.is_fullscreen();
                    self.coordinator.poll_fullscreen(fullscreen)
                }
                Some(signal) = signals.recv() => self.coordinator.environment(signal),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        warn!("exam handle dropped before submission");
                        return Err(RunnerError::Abandoned);
                    }
                },
                Some(joined) = flushes.join_next() => self.flush_settled(joined),
                Some(joined) = finishes.join_next() => match joined {
                    Ok(Ok(result)) => self.coordinator.finish_succeeded(result),
                    Ok(Err(err)) => self.coordinator.finish_failed(err.user_message()),
                    Err(err) => self.coordinator.finish_failed(err.to_string()),
                },
            };
            self.perform(effects, &mut flushes, &mut finishes);
            self.publish();
        }
    }

    fn observe_environment(&self, signals: mpsc::UnboundedSender<EnvironmentSignal>) {
        let focus = signals.clone();
        self.environment.on_focus_change(Box::new(move |signal| {
            let _ = focus.send(EnvironmentSignal::Focus(signal));
        }));
        self.environment.on_fullscreen_change(Box::new(move |signal| {
            let _ = signals.send(EnvironmentSignal::Fullscreen(signal));
        }));
    }

    fn handle_command(&mut self, command: ExamCommand) -> Vec<Effect> {
        let result = match command {
            ExamCommand::Answer {
                option,
                response_time_ms,
            } => self.coordinator.answer(option, response_time_ms),
            ExamCommand::DismissWarning => self.coordinator.dismiss_warning().map(|()| Vec::new()),
            ExamCommand::RetryFlush => self.coordinator.retry_flush(),
            ExamCommand::Finish => self.coordinator.request_finish(),
            ExamCommand::ClearError => {
                self.coordinator.clear_error();
                Ok(Vec::new())
            }
        };
        result.unwrap_or_else(|err| {
            debug!("{command:?} rejected: {err}");
            self.emit(ExamEvent::Rejected(err));
            Vec::new()
        })
    }

    fn flush_settled(
        &mut self,
        joined: Result<Result<AnswerBatchResult, ApiError>, JoinError>,
    ) -> Vec<Effect> {
        let Some(sent) = self.sending.take() else {
            warn!("flush completed with no batch on record");
            return Vec::new();
        };
        match joined {
            Ok(Ok(result)) => self.coordinator.batch_succeeded(&sent, result),
            Ok(Err(err)) => {
                if err.is_network() {
                    info!("batch not delivered, kept for retry: {err}");
                }
                self.coordinator.batch_failed(&sent, err.user_message())
            }
            Err(err) => self.coordinator.batch_failed(&sent, err.to_string()),
        }
    }

    fn perform(
        &mut self,
        effects: Vec<Effect>,
        flushes: &mut FlushTasks,
        finishes: &mut FinishTasks,
    ) {
        for effect in effects {
            match effect {
                Effect::SubmitBatch(request) => {
                    let api = Arc::clone(&self.api);
                    self.sending = Some(request.clone());
                    flushes.spawn(async move { api.submit_batch(&request).await });
                }
                Effect::Finish(request) => {
                    let api = Arc::clone(&self.api);
                    finishes.spawn(async move { api.finish_exam(request).await });
                }
                Effect::Warning(warning) => self.emit(ExamEvent::Warning(warning)),
                Effect::WarningCleared => self.emit(ExamEvent::WarningCleared),
                Effect::Terminated(kind) => {
                    self.terminated = Some(kind);
                    self.emit(ExamEvent::Terminated(kind));
                }
                Effect::TimeUp => self.emit(ExamEvent::TimeUp),
                Effect::Completed(result) => self.emit(ExamEvent::Completed(result)),
            }
        }
    }

    fn outcome(&self) -> Option<ExamOutcome> {
        let result = self.coordinator.result()?.clone();
        Some(ExamOutcome {
            attempt_id: self.coordinator.state().attempt_id()?,
            result,
            violations: self.coordinator.monitor().count(),
            timed_out: self.coordinator.timed_out(),
            terminated: self.terminated,
        })
    }

    fn emit(&self, event: ExamEvent) {
        // A closed receiver only means nobody is listening for notifications.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.view.send_replace(self.coordinator.view());
    }
}
