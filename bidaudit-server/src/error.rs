//! Error types for bidaudit-server
//!
//! Every handler error renders as the `{code, message}` envelope with `code`
//! equal to the HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bidaudit_common::api::ApiResponse;
use thiserror::Error;

use crate::services::agent_gateway::AgentError;
use crate::services::data_hub_client::DataHubError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Agent platform call failed
    #[error("Agent platform error: {0}")]
    Agent(#[from] AgentError),

    /// Data hub call failed
    #[error("Data hub error: {0}")]
    DataHub(#[from] DataHubError),

    /// bidaudit-common error
    #[error("{0}")]
    Common(#[from] bidaudit_common::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use bidaudit_common::Error as CommonError;

        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Common(CommonError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(CommonError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Common(CommonError::AlreadyExists(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client
    fn message(&self) -> String {
        use bidaudit_common::Error as CommonError;

        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            ApiError::Common(CommonError::AlreadyExists(what)) => {
                format!("{} already exists", what)
            }
            ApiError::Common(CommonError::NotFound(what)) => format!("{} not found", what),
            ApiError::Common(CommonError::InvalidInput(msg)) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %message, "Request rejected");
        }

        let body = Json(ApiResponse::<()>::error(i32::from(status.as_u16()), message));
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidaudit_common::Error as CommonError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Common(CommonError::InvalidInput("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Common(CommonError::AlreadyExists("Rule R1".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Common(CommonError::NotFound("Project p1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Common(CommonError::Internal("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_failures_are_internal() {
        let err = ApiError::from(AgentError::Api(502, "bad gateway".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Agent platform error: API error 502: bad gateway");
    }

    #[test]
    fn test_duplicate_message() {
        let err = ApiError::Common(CommonError::AlreadyExists("Audit rule R1".into()));
        assert_eq!(err.message(), "Audit rule R1 already exists");
    }
}
