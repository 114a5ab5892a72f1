/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Malformed trace context: {0}")]
    MalformedTraceContext(String),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The upstream completion call failed; surfaced to the caller.
    UpstreamCall,
    /// Recovered locally, never surfaced as a request error.
    Degraded,
    ServerError,
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::Upstream { .. } | RelayError::Transport(_) => ErrorCategory::UpstreamCall,
            RelayError::MalformedTraceContext(_) | RelayError::Telemetry(_) => {
                ErrorCategory::Degraded
            }
            RelayError::Config(_) | RelayError::Internal(_) => ErrorCategory::ServerError,
        }
    }

    /// HTTP status the caller sees when this error terminates a request.
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        match self.category() {
            ErrorCategory::UpstreamCall => http::StatusCode::BAD_GATEWAY,
            ErrorCategory::Degraded | ErrorCategory::ServerError => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn error_type_label(err: &RelayError) -> &'static str {
    match err {
        RelayError::Upstream { .. } => "upstream_error",
        RelayError::Transport(_) => "transport_error",
        RelayError::Config(_) => "config_error",
        RelayError::MalformedTraceContext(_) => "trace_context_error",
        RelayError::Telemetry(_) => "telemetry_error",
        RelayError::Internal(_) => "internal_error",
    }
}

/// Format an error as an OpenAI-style JSON payload.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let status = err.http_status();
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": error_type_label(err),
        }
    });
    (status, body)
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}
