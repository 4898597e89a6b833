use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use hark_core::error::{CommandError, HarkError, ToolError};

/// JSON API error: `{"error": "..."}` with a mapped status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Failure of an upstream service (model or speech-to-text).
    fn upstream(err: &HarkError) -> Self {
        match err {
            HarkError::Config(_) => Self::internal(err.to_string()),
            HarkError::InvalidInput(_) => Self::unprocessable(err.to_string()),
            _ if err.is_transient() => Self::unavailable(err.to_string()),
            _ => Self::bad_gateway(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(target: "hark::http", status = %self.status, "api error: {}", self.message);
        } else {
            tracing::warn!(target: "hark::http", status = %self.status, "api error: {}", self.message);
        }
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        match &err {
            CommandError::Input(_) => Self::unprocessable(err.to_string()),
            CommandError::Tool(tool) if tool.is_validation() => Self::unprocessable(err.to_string()),
            CommandError::Tool(ToolError::Store(inner)) if inner.is_transient() => {
                Self::unavailable(err.to_string())
            }
            CommandError::Tool(ToolError::Store(_)) => Self::internal(err.to_string()),
            CommandError::Model(inner) => Self::upstream(inner),
            _ => Self::bad_gateway(err.to_string()),
        }
    }
}

/// Errors from the speech-to-text step.
impl From<HarkError> for ApiError {
    fn from(err: HarkError) -> Self {
        Self::upstream(&err)
    }
}
