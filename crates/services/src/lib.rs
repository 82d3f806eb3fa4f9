#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod environment;
pub mod error;
pub mod runner;

pub use exam_core::{Clock, ExamPolicy, ExamView};

pub use api::{ExamApi, HealthStatus, HttpExamApi};
pub use config::ClientConfig;
pub use environment::{EnvironmentObserver, SyntheticEnvironment};
pub use error::{ApiError, ConfigError, RunnerError};
pub use runner::{ExamCommand, ExamEvent, ExamHandle, ExamOutcome, ExamRunner};
