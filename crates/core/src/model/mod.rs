mod answer;
mod ids;
mod item;
pub mod wire;

pub use answer::{AnswerKey, AnswerOption, AnswerOptionError, AnswerRecord};
pub use ids::{AttemptId, ItemId, ParseIdError};
pub use item::{Item, MediaAsset, MediaError, MediaKind};
pub use wire::{
    AnswerBatchRequest, AnswerBatchResult, ExamReport, ExamStart, ExamStateView, FinishRequest,
    FinishResult, StartPayloadError,
};
