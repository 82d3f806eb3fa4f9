//! Shared error types for the services crate.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use exam_core::{PolicyError, SessionError};

const GENERIC_FAILURE: &str = "An unexpected error occurred";

/// Errors emitted by `ExamApi` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Non-2xx response carrying the backend's `{detail, error_code?}` body.
    #[error("{detail}")]
    Backend {
        status: StatusCode,
        detail: String,
        code: Option<String>,
    },
    #[error("exam backend returned status {0}")]
    HttpStatus(StatusCode),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
    #[serde(default)]
    error_code: Option<String>,
}

impl ApiError {
    /// Decodes a failed response body. Bodies without a `detail` string
    /// collapse to `HttpStatus`.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => ApiError::Backend {
                status,
                detail: parsed.detail,
                code: parsed.error_code,
            },
            Err(_) => ApiError::HttpStatus(status),
        }
    }

    /// The single string shown to the user for this failure.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Backend { detail, .. } if !detail.trim().is_empty() => detail.clone(),
            ApiError::Backend { .. } | ApiError::HttpStatus(_) => GENERIC_FAILURE.into(),
            ApiError::Http(err) if err.is_timeout() => "The request timed out".into(),
            ApiError::Http(err) if err.is_connect() || err.is_request() => "Network Error".into(),
            ApiError::Http(err) => err.to_string(),
            ApiError::Endpoint(err) => err.to_string(),
        }
    }

    /// True for transport failures where retrying the same request can help.
    #[must_use]
    pub fn is_network(&self) -> bool {
        match self {
            ApiError::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            ApiError::Backend { status, .. } | ApiError::HttpStatus(status) => {
                status.is_server_error()
            }
            ApiError::Endpoint(_) => false,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Backend { status, .. } | ApiError::HttpStatus(status) => Some(*status),
            ApiError::Http(err) => err.status(),
            ApiError::Endpoint(_) => None,
        }
    }
}

/// Errors emitted while reading client configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid {key} value: {raw}")]
    InvalidValue { key: &'static str, raw: String },
    #[error("invalid API base URL {raw}: {source}")]
    InvalidBaseUrl {
        raw: String,
        source: url::ParseError,
    },
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Errors emitted by `ExamRunner` and `ExamHandle`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    #[error("could not start the exam: {0}")]
    Start(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("exam abandoned before it was submitted")]
    Abandoned,
    #[error("exam runner is no longer running")]
    Stopped,
}
