//! W3C trace-context parsing.
//!
//! The inbound `traceparent` header has the form
//! `version-traceId-spanId-flags`; the operation id used to tag usage
//! events is the `traceId` field. Parsing is a pure function here so the
//! coupling between the trace header and downstream metric tags stays
//! explicit.

use axum::http::HeaderMap;

use crate::error::RelayError;

pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Extract the operation id (trace id) from a raw `traceparent` value.
///
/// # Errors
///
/// Returns `RelayError::MalformedTraceContext` when the header has fewer
/// than two hyphen-delimited fields or the trace id field is empty.
pub fn extract_operation_id(traceparent: &str) -> Result<&str, RelayError> {
    let mut fields = traceparent.split('-');
    let _version = fields.next();
    match fields.next() {
        Some(trace_id) if !trace_id.is_empty() => Ok(trace_id),
        _ => Err(RelayError::MalformedTraceContext(format!(
            "expected version-traceId-spanId-flags, got '{traceparent}'"
        ))),
    }
}

/// Derive the operation id for a request, degrading to an empty id.
///
/// Tracing is observability, not business logic: a missing or malformed
/// header is logged and the request proceeds untagged.
#[must_use]
pub fn operation_id_from_headers(headers: &HeaderMap) -> String {
    let Some(raw) = headers.get(TRACEPARENT_HEADER) else {
        tracing::debug!("no traceparent header; usage events will carry an empty operation id");
        return String::new();
    };
    let Ok(value) = raw.to_str() else {
        tracing::debug!("traceparent header is not valid ASCII; degrading operation id");
        return String::new();
    };
    match extract_operation_id(value) {
        Ok(operation_id) => operation_id.to_string(),
        Err(err) => {
            tracing::debug!("{err}; degrading operation id");
            String::new()
        }
    }
}
