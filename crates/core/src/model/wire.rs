//! Request and response shapes exchanged with the exam backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::model::answer::{AnswerOption, AnswerRecord};
use crate::model::ids::{AttemptId, ItemId};
use crate::model::item::Item;

const DEFAULT_SE: f64 = 1.0;
const DEFAULT_LEARNING_RATE: f64 = 0.5;

fn default_se() -> f64 {
    DEFAULT_SE
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

/// Reasons a start payload cannot open a session.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum StartPayloadError {
    #[error("item {0} appears more than once in the inventory")]
    DuplicateItem(ItemId),

    #[error("item {0} has no question text")]
    BlankQuestion(ItemId),

    #[error("item {item} has no text for option {option}")]
    BlankOption { item: ItemId, option: AnswerOption },

    #[error("ability estimate is not a finite number")]
    NonFiniteAbility,

    #[error("learning rate must be in (0, 1], got {0}")]
    InvalidLearningRate(f64),
}

/// `POST /exam/start` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamStart {
    pub exam_attempt_id: AttemptId,
    #[serde(default)]
    pub theta: f64,
    #[serde(default = "default_se")]
    pub se_theta: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub pilot_start_pos: u32,
    pub question_inventory: Vec<Item>,
}

impl ExamStart {
    /// Checks the payload before it is allowed to seed a session.
    ///
    /// An empty inventory is valid: the session opens already eligible for
    /// finalization.
    ///
    /// # Errors
    ///
    /// Returns the first `StartPayloadError` found.
    pub fn validate(&self) -> Result<(), StartPayloadError> {
        if !self.theta.is_finite() || !self.se_theta.is_finite() {
            return Err(StartPayloadError::NonFiniteAbility);
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(StartPayloadError::InvalidLearningRate(self.learning_rate));
        }

        let mut seen = HashSet::with_capacity(self.question_inventory.len());
        for item in &self.question_inventory {
            if !seen.insert(item.id) {
                return Err(StartPayloadError::DuplicateItem(item.id));
            }
            if item.question_text.trim().is_empty() {
                return Err(StartPayloadError::BlankQuestion(item.id));
            }
            if let Some((option, _)) = item
                .labelled_options()
                .find(|(_, text)| text.trim().is_empty())
            {
                return Err(StartPayloadError::BlankOption {
                    item: item.id,
                    option,
                });
            }
        }
        Ok(())
    }
}

/// `POST /exam/answer-batch` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerBatchRequest {
    pub exam_attempt_id: AttemptId,
    pub answers: Vec<AnswerRecord>,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub current_position: u32,
    /// Lets the backend drop a batch it already applied when a retry races
    /// a slow acknowledgement.
    pub idempotency_key: Uuid,
}

/// `POST /exam/answer-batch` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerBatchResult {
    pub exam_attempt_id: AttemptId,
    pub theta: f64,
    pub se: f64,
    pub learning_rate: f64,
    pub position: u32,
    pub stop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_inventory: Option<Vec<Item>>,
}

impl AnswerBatchResult {
    /// Items delivered with this result, if any.
    #[must_use]
    pub fn delivered(&self) -> &[Item] {
        self.question_inventory.as_deref().unwrap_or_default()
    }
}

/// `POST /exam/finish` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRequest {
    pub exam_attempt_id: AttemptId,
}

/// `POST /exam/finish` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishResult {
    pub theta_hat: Option<f64>,
    pub se_theta: Option<f64>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_score: Option<f64>,
}

/// `GET /exam/{id}/state` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamStateView {
    pub exam_attempt_id: AttemptId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub position: u32,
    pub theta_hat: Option<f64>,
    pub se_theta: Option<f64>,
    #[serde(default)]
    pub is_report_unlocked: bool,
}

/// `GET /exam/{id}/report` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamReport {
    pub exam_attempt_id: AttemptId,
    pub raw_score: f64,
    pub theta_hat: f64,
    pub se_theta: f64,
    pub completed_at: DateTime<Utc>,
    pub total_items: u32,
    pub items_scored: u32,
    pub scaled_score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn item(id: u64) -> Item {
        Item {
            id: ItemId::new(id),
            position: u32::try_from(id).unwrap(),
            question_text: format!("Q{id}"),
            options: ["a", "b", "c", "d", "e"].map(String::from),
            category: None,
            is_scored: Some(true),
            media: Vec::new(),
        }
    }

    fn start(items: Vec<Item>) -> ExamStart {
        ExamStart {
            exam_attempt_id: AttemptId::new(1),
            theta: 0.0,
            se_theta: 1.0,
            learning_rate: 0.5,
            pilot_start_pos: 0,
            question_inventory: items,
        }
    }

    #[test]
    fn start_payload_fills_backend_defaults() {
        let json = r#"{"exam_attempt_id": 12, "question_inventory": []}"#;
        let payload: ExamStart = serde_json::from_str(json).unwrap();
        assert_eq!(payload.theta, 0.0);
        assert_eq!(payload.se_theta, 1.0);
        assert_eq!(payload.learning_rate, 0.5);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn start_payload_without_inventory_is_malformed() {
        let json = r#"{"exam_attempt_id": 12}"#;
        assert!(serde_json::from_str::<ExamStart>(json).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_items() {
        let err = start(vec![item(1), item(2), item(1)]).validate().unwrap_err();
        assert_eq!(err, StartPayloadError::DuplicateItem(ItemId::new(1)));
    }

    #[test]
    fn validate_rejects_blank_option() {
        let mut broken = item(4);
        broken.options[2] = "   ".into();
        let err = start(vec![broken]).validate().unwrap_err();
        assert_eq!(
            err,
            StartPayloadError::BlankOption {
                item: ItemId::new(4),
                option: AnswerOption::C
            }
        );
    }

    #[test]
    fn validate_rejects_bad_learning_rate_and_ability() {
        let mut payload = start(vec![item(1)]);
        payload.learning_rate = 0.0;
        assert!(matches!(
            payload.validate(),
            Err(StartPayloadError::InvalidLearningRate(_))
        ));

        let mut payload = start(vec![item(1)]);
        payload.theta = f64::NAN;
        assert_eq!(payload.validate(), Err(StartPayloadError::NonFiniteAbility));
    }

    #[test]
    fn batch_result_tolerates_null_inventory() {
        let json = r#"{"exam_attempt_id": 1, "theta": 0.4, "se": 0.6,
            "learning_rate": 0.5, "position": 3, "stop": false,
            "question_inventory": null}"#;
        let result: AnswerBatchResult = serde_json::from_str(json).unwrap();
        assert!(result.delivered().is_empty());
    }

    #[test]
    fn batch_request_serializes_option_as_number() {
        let request = AnswerBatchRequest {
            exam_attempt_id: AttemptId::new(9),
            answers: vec![AnswerRecord::stamp(
                ItemId::new(5),
                AnswerOption::E,
                1_000,
                fixed_now(),
            )],
            batch_size: 6,
            learning_rate: 0.5,
            current_position: 1,
            idempotency_key: Uuid::nil(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["answers"][0]["selected_option"], 5);
        assert_eq!(value["answers"][0]["item_id"], 5);
        assert_eq!(value["current_position"], 1);
    }
}
