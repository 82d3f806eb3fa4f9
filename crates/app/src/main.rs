use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use exam_core::model::{AnswerOption, AttemptId, Item, ItemId};
use exam_core::proctor::ViolationKind;
use log::warn;
use services::{
    ClientConfig, Clock, ExamApi, ExamCommand, ExamEvent, ExamHandle, ExamOutcome, ExamRunner,
    HttpExamApi, SyntheticEnvironment,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidApi { raw: String },
    InvalidAttemptId { raw: String },
    MissingAttemptId,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidApi { raw } => write!(f, "invalid --api value: {raw}"),
            ArgsError::InvalidAttemptId { raw } => write!(f, "invalid --attempt value: {raw}"),
            ArgsError::MissingAttemptId => write!(f, "state requires --attempt <id>"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- play   [--api <url>] [--token <token>]");
    eprintln!("  cargo run -p app -- state  --attempt <id> [--api <url>] [--token <token>]");
    eprintln!("  cargo run -p app -- health [--api <url>]");
    eprintln!();
    eprintln!("While playing, type A-E or 1-5 to answer, `finish` to submit,");
    eprintln!("`retry` after a failed sync, `dismiss` to close a warning, `quit` to leave.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_API_BASE, EXAM_API_TOKEN, EXAM_HTTP_TIMEOUT_SECS, EXAM_DURATION_HOURS,");
    eprintln!("  EXAM_BATCH_SIZE, EXAM_FLUSH_MULTIPLE, EXAM_LOW_INVENTORY, EXAM_MAX_VIOLATIONS,");
    eprintln!("  EXAM_FULLSCREEN_POLL_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    State,
    Health,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "play" => Some(Self::Play),
            "state" => Some(Self::State),
            "health" => Some(Self::Health),
            _ => None,
        }
    }
}

struct Args {
    config: ClientConfig,
    attempt_id: Option<AttemptId>,
}

impl Args {
    fn parse(
        mut config: ClientConfig,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut attempt_id = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => {
                    let value = require_value(args, "--api")?;
                    config = config
                        .with_base_url(&value)
                        .map_err(|_| ArgsError::InvalidApi { raw: value.clone() })?;
                }
                "--token" => {
                    config = config.with_token(require_value(args, "--token")?);
                }
                "--attempt" => {
                    let value = require_value(args, "--attempt")?;
                    let parsed: AttemptId = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidAttemptId { raw: value.clone() })?;
                    attempt_id = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(Self { config, attempt_id })
    }
}

//
// ─── PLAY ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Answer(AnswerOption),
    Command(ExamCommand),
    Quit,
    Unknown,
}

fn parse_input(raw: &str) -> Input {
    match raw.trim().to_ascii_lowercase().as_str() {
        "finish" | "submit" => Input::Command(ExamCommand::Finish),
        "retry" => Input::Command(ExamCommand::RetryFlush),
        "dismiss" => Input::Command(ExamCommand::DismissWarning),
        "clear" => Input::Command(ExamCommand::ClearError),
        "quit" | "exit" => Input::Quit,
        other => other.parse().map_or(Input::Unknown, Input::Answer),
    }
}

fn format_clock(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

fn describe(kind: ViolationKind) -> &'static str {
    match kind {
        ViolationKind::Tab => "tab switch",
        ViolationKind::Fullscreen => "fullscreen exit",
    }
}

fn print_question(item: &Item, number: Option<u32>, seconds_remaining: u64) {
    println!();
    match number {
        Some(n) => println!("Question {n}  ({} left)", format_clock(seconds_remaining)),
        None => println!("Question  ({} left)", format_clock(seconds_remaining)),
    }
    println!("{}", item.question_text);
    for media in &item.media {
        let alt = media.alt_text.as_deref().unwrap_or("");
        println!("  [{:?}] {} {alt}", media.kind, media.url);
    }
    for (option, text) in item.labelled_options() {
        println!("  {}. {text}", option.letter());
    }
}

fn print_event(event: &ExamEvent) {
    match event {
        ExamEvent::Warning(warning) => println!(
            "Warning: {} ({} of {}). Return to the exam; {} more ends it.",
            describe(warning.kind),
            warning.count,
            warning.max,
            warning.strikes_left()
        ),
        ExamEvent::WarningCleared => println!("Violation resolved."),
        ExamEvent::Terminated(kind) => {
            println!("Too many violations ({}); submitting your exam.", describe(*kind));
        }
        ExamEvent::TimeUp => println!("Time is up; submitting your exam."),
        ExamEvent::Completed(_) => {}
        ExamEvent::Rejected(err) => println!("Not accepted: {err}"),
    }
}

async fn send(handle: &ExamHandle, command: ExamCommand) {
    if let Err(err) = handle.send(command).await {
        warn!("{command:?} not delivered: {err}");
    }
}

async fn play(
    api: Arc<HttpExamApi>,
    config: &ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let shared: Arc<dyn ExamApi> = api.clone();
    let (runner, mut handle) = ExamRunner::new(
        shared,
        config.policy.clone(),
        Clock::default(),
        Box::new(SyntheticEnvironment::fullscreen()),
    );
    let mut task = tokio::spawn(runner.run());
    let mut views = handle.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut shown: Option<ItemId> = None;
    let mut last_error: Option<String> = None;
    let mut asked_at = Instant::now();

    let outcome = loop {
        tokio::select! {
            joined = &mut task => break joined??,
            Some(event) = handle.next_event() => print_event(&event),
            Ok(()) = views.changed() => {
                let view = views.borrow_and_update().clone();
                let current = view.current.as_ref().map(|item| item.id);
                if current != shown {
                    shown = current;
                    asked_at = Instant::now();
                    if let Some(item) = &view.current {
                        print_question(item, view.question_number, view.seconds_remaining);
                    }
                }
                if view.error != last_error {
                    if let Some(err) = &view.error {
                        println!("! {err}  (type `retry` to resend, `clear` to hide)");
                    }
                    last_error = view.error;
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                None => {
                    stdin_open = false;
                    send(&handle, ExamCommand::Finish).await;
                }
                Some(raw) => match parse_input(&raw) {
                    Input::Answer(option) => {
                        let elapsed = u64::try_from(asked_at.elapsed().as_millis())
                            .unwrap_or(u64::MAX);
                        send(&handle, ExamCommand::Answer {
                            option,
                            response_time_ms: elapsed,
                        })
                        .await;
                    }
                    Input::Command(command) => send(&handle, command).await,
                    Input::Quit => {
                        task.abort();
                        println!("Left without submitting.");
                        return Ok(());
                    }
                    Input::Unknown => {
                        println!("Type A-E or 1-5, or finish, retry, dismiss, clear, quit.");
                    }
                },
            },
        }
    };

    print_outcome(&outcome);
    match api.exam_report(outcome.attempt_id).await {
        Ok(report) => {
            println!(
                "Report: raw score {:.1}, {} of {} items scored",
                report.raw_score, report.items_scored, report.total_items
            );
            if let Some(scaled) = report.scaled_score {
                println!("Scaled score: {scaled:.0}");
            }
        }
        Err(err) => match err.status() {
            Some(status) => println!("Report unavailable ({status}): {}", err.user_message()),
            None => println!("Report: {}", err.user_message()),
        },
    }
    Ok(())
}

fn print_outcome(outcome: &ExamOutcome) {
    println!();
    println!("Exam {} submitted at {}", outcome.attempt_id, outcome.result.completed_at.to_rfc3339());
    if let (Some(theta), Some(se)) = (outcome.result.theta_hat, outcome.result.se_theta) {
        println!("Ability estimate: {theta:.3} (SE {se:.3})");
    }
    if outcome.timed_out {
        println!("Submitted when time ran out.");
    }
    if let Some(kind) = outcome.terminated {
        println!("Submitted after repeated {} violations.", describe(kind));
    }
    println!("Violations: {}", outcome.violations);
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: start an exam when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Play,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Play,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let config = ClientConfig::from_env()?;
    let mut iter = argv.into_iter();
    let parsed = Args::parse(config, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let api = Arc::new(HttpExamApi::new(&parsed.config)?);

    match cmd {
        Command::Play => play(api, &parsed.config).await,
        Command::Health => {
            let status = api.health().await.map_err(|e| e.user_message())?;
            match status.timestamp {
                Some(at) => println!("backend: {} ({at})", status.status),
                None => println!("backend: {}", status.status),
            }
            Ok(())
        }
        Command::State => {
            let attempt_id = parsed.attempt_id.ok_or(ArgsError::MissingAttemptId)?;
            let state = api
                .exam_state(attempt_id)
                .await
                .map_err(|e| e.user_message())?;
            println!("Attempt {}: position {}", state.exam_attempt_id, state.position);
            println!("Started: {}", state.started_at.to_rfc3339());
            match state.completed_at {
                Some(at) => println!("Completed: {}", at.to_rfc3339()),
                None => println!("Completed: not yet"),
            }
            if let (Some(theta), Some(se)) = (state.theta_hat, state.se_theta) {
                println!("Ability estimate: {theta:.3} (SE {se:.3})");
            }
            println!(
                "Report: {}",
                if state.is_report_unlocked { "unlocked" } else { "locked" }
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
