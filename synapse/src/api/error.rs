//! API error types

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agents::AgentError;
use crate::dispatch::{DispatchError, ExecutionFailure};
use crate::handlers::HandlerError;
use crate::training::TrainingError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest { code: &'static str, message: String },
    Conflict { code: &'static str, message: String },
    Timeout(String),
    Internal { code: &'static str, message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code: "ValidationError",
            message: message.into(),
        }
    }

    /// Stable machine-readable code carried in the response body
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Internal { code, .. } => *code,
            ApiError::Timeout(_) => "Timeout",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::NotFound(message)
            | ApiError::Timeout(message)
            | ApiError::BadRequest { message, .. }
            | ApiError::Conflict { message, .. }
            | ApiError::Internal { message, .. } => message.as_str(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.message().to_string(),
            },
        });

        (status, body).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            AgentError::NotFound(_) => ApiError::NotFound(message),
            AgentError::StatusConflict { .. } => ApiError::Conflict { code, message },
            AgentError::Validation(_) | AgentError::ImmutableField { .. } => {
                ApiError::BadRequest { code, message }
            }
        }
    }
}

impl From<TrainingError> for ApiError {
    fn from(err: TrainingError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            TrainingError::AgentNotFound(_) | TrainingError::JobNotFound(_) => {
                ApiError::NotFound(message)
            }
            TrainingError::Conflict { .. } => ApiError::Conflict { code, message },
            TrainingError::ShutDown => ApiError::Internal { code, message },
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            DispatchError::NotFound(_) => ApiError::NotFound(message),
            DispatchError::TypeMismatch { .. } | DispatchError::UnknownOperation { .. } => {
                ApiError::BadRequest { code, message }
            }
            DispatchError::AgentNotReady { .. } => ApiError::Conflict { code, message },
        }
    }
}

impl From<ExecutionFailure> for ApiError {
    fn from(err: ExecutionFailure) -> Self {
        let message = err.to_string();
        match err {
            ExecutionFailure::Timeout(_) => ApiError::Timeout(message),
            ExecutionFailure::Handler(HandlerError::InvalidInput(_)) => ApiError::validation(message),
            ExecutionFailure::Handler(HandlerError::Failed(_)) | ExecutionFailure::Panicked(_) => {
                ApiError::Internal {
                    code: "HandlerError",
                    message,
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal {
            code: "InternalError",
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentStatus;
    use crate::agents::AgentType;
    use std::time::Duration;

    #[test]
    fn test_agent_error_mapping() {
        let err: ApiError = AgentError::ImmutableField { field: "type" }.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "ImmutableFieldError");

        let err: ApiError = AgentError::NotFound("a".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NotFound");
    }

    #[test]
    fn test_dispatch_error_mapping() {
        let err: ApiError = DispatchError::TypeMismatch {
            declared: "make".into(),
            actual: AgentType::Insights,
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "TypeMismatch");

        let err: ApiError = DispatchError::AgentNotReady {
            id: "a".into(),
            status: AgentStatus::Created,
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "AgentNotReady");
    }

    #[test]
    fn test_execution_failure_mapping() {
        let err: ApiError = ExecutionFailure::Timeout(Duration::from_millis(10)).into();
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "Timeout");

        let err: ApiError = ExecutionFailure::Handler(HandlerError::invalid("no text")).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "ValidationError");

        let err: ApiError = ExecutionFailure::Panicked("boom".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "HandlerError");
    }

    #[test]
    fn test_training_conflict_mapping() {
        let err: ApiError = TrainingError::Conflict {
            agent_id: "a".into(),
            job_id: "j".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "Conflict");
    }
}
