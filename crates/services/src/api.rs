//! Exam backend port and its HTTP adapter.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use exam_core::model::{
    AnswerBatchRequest, AnswerBatchResult, AttemptId, ExamReport, ExamStart, ExamStateView,
    FinishRequest, FinishResult,
};

use crate::config::ClientConfig;
use crate::error::ApiError;

/// Path prefix for every exam endpoint. `/health` sits outside it.
pub const API_PREFIX: &str = "api/v1/";

/// `GET /health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Remote scoring and item-selection service.
#[async_trait]
pub trait ExamApi: Send + Sync {
    /// Opens a new attempt and returns its initial inventory.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport or backend failures.
    async fn start_exam(&self) -> Result<ExamStart, ApiError>;

    /// Sends buffered answers and receives the updated ability estimate.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport or backend failures.
    async fn submit_batch(
        &self,
        request: &AnswerBatchRequest,
    ) -> Result<AnswerBatchResult, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` for transport or backend failures.
    async fn finish_exam(&self, request: FinishRequest) -> Result<FinishResult, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` for transport or backend failures.
    async fn exam_state(&self, attempt_id: AttemptId) -> Result<ExamStateView, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` for transport or backend failures, including a
    /// report that is not unlocked yet.
    async fn exam_report(&self, attempt_id: AttemptId) -> Result<ExamReport, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` when the backend is unreachable.
    async fn health(&self) -> Result<HealthStatus, ApiError>;
}

/// `ExamApi` over the backend's REST interface.
#[derive(Clone)]
pub struct HttpExamApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpExamApi {
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(API_PREFIX)?.join(path)?)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("exam backend answered {status}");
            return Err(ApiError::from_response(status, &body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn start_exam(&self) -> Result<ExamStart, ApiError> {
        let url = self.endpoint("exam/start")?;
        self.send(self.client.post(url)).await
    }

    async fn submit_batch(
        &self,
        request: &AnswerBatchRequest,
    ) -> Result<AnswerBatchResult, ApiError> {
        let url = self.endpoint("exam/answer-batch")?;
        self.send(self.client.post(url).json(request)).await
    }

    async fn finish_exam(&self, request: FinishRequest) -> Result<FinishResult, ApiError> {
        let url = self.endpoint("exam/finish")?;
        self.send(self.client.post(url).json(&request)).await
    }

    async fn exam_state(&self, attempt_id: AttemptId) -> Result<ExamStateView, ApiError> {
        let url = self.endpoint(&format!("exam/{attempt_id}/state"))?;
        self.send(self.client.get(url)).await
    }

    async fn exam_report(&self, attempt_id: AttemptId) -> Result<ExamReport, ApiError> {
        let url = self.endpoint(&format!("exam/{attempt_id}/report"))?;
        self.send(self.client.get(url)).await
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        let url = self.base.join("health")?;
        self.send(self.client.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpExamApi {
        HttpExamApi::new(&ClientConfig::new(base).unwrap()).unwrap()
    }

    #[test]
    fn endpoints_sit_under_prefix() {
        let api = api("http://localhost:8000");
        assert_eq!(
            api.endpoint("exam/answer-batch").unwrap().as_str(),
            "http://localhost:8000/api/v1/exam/answer-batch"
        );
        assert_eq!(
            api.endpoint(&format!("exam/{}/report", AttemptId::new(12)))
                .unwrap()
                .as_str(),
            "http://localhost:8000/api/v1/exam/12/report"
        );
    }

    #[test]
    fn base_path_is_preserved() {
        let api = api("https://exam.example.com/backend");
        assert_eq!(
            api.endpoint("exam/start").unwrap().as_str(),
            "https://exam.example.com/backend/api/v1/exam/start"
        );
        assert_eq!(
            api.base.join("health").unwrap().as_str(),
            "https://exam.example.com/backend/health"
        );
    }

    #[test]
    fn health_status_tolerates_missing_timestamp() {
        let status: HealthStatus = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(status.status, "ok");
        assert_eq!(status.timestamp, None);
    }
}
