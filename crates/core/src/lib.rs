#![forbid(unsafe_code)]

pub mod coordinator;
pub mod error;
pub mod flush;
pub mod model;
pub mod policy;
pub mod proctor;
pub mod session;
pub mod time;
pub mod timer;

pub use coordinator::{Effect, ExamCoordinator, ExamView};
pub use error::{LockReason, SessionError};
pub use policy::{ExamPolicy, PolicyError};
pub use time::Clock;
