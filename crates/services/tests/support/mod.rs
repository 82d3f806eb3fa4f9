use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use exam_core::model::{
    AnswerBatchRequest, AnswerBatchResult, AttemptId, ExamReport, ExamStart, ExamStateView,
    FinishRequest, FinishResult, Item, ItemId,
};
use exam_core::time::fixed_now;
use services::{ApiError, ExamApi, HealthStatus};

pub const ATTEMPT: u64 = 501;

pub fn item(id: u64) -> Item {
    Item {
        id: ItemId::new(id),
        position: u32::try_from(id).unwrap(),
        question_text: format!("Which finding fits case {id}?"),
        options: ["Alpha", "Beta", "Gamma", "Delta", "Epsilon"].map(String::from),
        category: Some("Cardiology".into()),
        is_scored: Some(true),
        media: Vec::new(),
    }
}

fn unavailable(detail: &str) -> ApiError {
    ApiError::Backend {
        status: StatusCode::SERVICE_UNAVAILABLE,
        detail: detail.into(),
        code: None,
    }
}

#[derive(Default)]
struct Script {
    acknowledged: u32,
    acknowledged_items: Vec<u64>,
    batch_failures: u32,
    finish_failures: u32,
    batches: Vec<AnswerBatchRequest>,
    finish_calls: u32,
}

/// Backend double that serves the whole inventory up front and stops once
/// every item has been acknowledged.
pub struct ScriptedApi {
    start: Option<ExamStart>,
    total: u32,
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new(items: u64) -> Self {
        Self::with_inventory((1..=items).map(item).collect())
    }

    pub fn with_inventory(inventory: Vec<Item>) -> Self {
        Self {
            total: u32::try_from(inventory.len()).unwrap(),
            start: Some(ExamStart {
                exam_attempt_id: AttemptId::new(ATTEMPT),
                theta: 0.0,
                se_theta: 1.0,
                learning_rate: 0.5,
                pilot_start_pos: 0,
                question_inventory: inventory,
            }),
            script: Mutex::new(Script::default()),
        }
    }

    pub fn failing_start() -> Self {
        Self {
            start: None,
            total: 0,
            script: Mutex::new(Script::default()),
        }
    }

    pub fn fail_next_batches(&self, count: u32) {
        self.script.lock().unwrap().batch_failures = count;
    }

    pub fn fail_next_finishes(&self, count: u32) {
        self.script.lock().unwrap().finish_failures = count;
    }

    /// Every batch received, failed ones included.
    pub fn batches(&self) -> Vec<AnswerBatchRequest> {
        self.script.lock().unwrap().batches.clone()
    }

    pub fn acknowledged_items(&self) -> Vec<u64> {
        self.script.lock().unwrap().acknowledged_items.clone()
    }

    pub fn finish_calls(&self) -> u32 {
        self.script.lock().unwrap().finish_calls
    }
}

#[async_trait]
impl ExamApi for ScriptedApi {
    async fn start_exam(&self) -> Result<ExamStart, ApiError> {
        self.start
            .clone()
            .ok_or_else(|| unavailable("Exam service is down"))
    }

    async fn submit_batch(
        &self,
        request: &AnswerBatchRequest,
    ) -> Result<AnswerBatchResult, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.batches.push(request.clone());
        if script.batch_failures > 0 {
            script.batch_failures -= 1;
            return Err(unavailable("Service unavailable"));
        }
        script.acknowledged += u32::try_from(request.answers.len()).unwrap();
        script
            .acknowledged_items
            .extend(request.answers.iter().map(|a| a.item_id.value()));
        Ok(AnswerBatchResult {
            exam_attempt_id: request.exam_attempt_id,
            theta: 0.1 * f64::from(script.acknowledged),
            se: 1.0 / f64::from(script.acknowledged + 1),
            learning_rate: request.learning_rate,
            position: script.acknowledged,
            stop: script.acknowledged >= self.total,
            question_inventory: None,
        })
    }

    async fn finish_exam(&self, request: FinishRequest) -> Result<FinishResult, ApiError> {
        assert_eq!(request.exam_attempt_id, AttemptId::new(ATTEMPT));
        let mut script = self.script.lock().unwrap();
        script.finish_calls += 1;
        if script.finish_failures > 0 {
            script.finish_failures -= 1;
            return Err(unavailable("Could not finish exam"));
        }
        Ok(FinishResult {
            theta_hat: Some(0.42),
            se_theta: Some(0.31),
            completed_at: fixed_now(),
            raw_score: None,
        })
    }

    async fn exam_state(&self, attempt_id: AttemptId) -> Result<ExamStateView, ApiError> {
        let script = self.script.lock().unwrap();
        Ok(ExamStateView {
            exam_attempt_id: attempt_id,
            started_at: fixed_now(),
            completed_at: (script.finish_calls > 0).then(fixed_now),
            position: script.acknowledged,
            theta_hat: None,
            se_theta: None,
            is_report_unlocked: false,
        })
    }

    async fn exam_report(&self, _attempt_id: AttemptId) -> Result<ExamReport, ApiError> {
        Err(ApiError::Backend {
            status: StatusCode::PAYMENT_REQUIRED,
            detail: "Report locked".into(),
            code: Some("REPORT_LOCKED".into()),
        })
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        Ok(HealthStatus {
            status: "ok".into(),
            timestamp: None,
        })
    }
}
