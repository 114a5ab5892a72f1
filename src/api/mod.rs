pub mod ask;
pub mod cities;
pub mod health;
pub mod streaming;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::request::Parts;

use crate::completion::ChatCompletion;
use crate::observability::token_counter::count_tokens;
use crate::state::AppState;

/// The caller's question: query parameter first, then JSON body field.
/// Invalid JSON bodies are ignored rather than rejected.
pub(crate) fn extract_question(parts: &Parts, body: &Bytes) -> Option<String> {
    if let Some(query) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "question" && !value.trim().is_empty() {
                return Some(value.into_owned());
            }
        }
    }

    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("question")
                .and_then(|q| q.as_str())
                .filter(|q| !q.trim().is_empty())
                .map(str::to_string)
        })
}

/// Billable tokens for a buffered completion: trust the upstream usage
/// field, fall back to counting the answer locally only when it is absent.
pub(crate) fn buffered_total_tokens(state: &AppState, completion: &ChatCompletion) -> u64 {
    if let Some(usage) = &completion.usage {
        return usage.total_tokens;
    }
    tracing::debug!("upstream completion carried no usage field; counting answer text locally");
    match count_tokens(
        completion.first_content(),
        &state.config.telemetry.token_encoding,
    ) {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::warn!("fallback token counting failed: {err}");
            0
        }
    }
}

pub(crate) fn text_response(body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

pub(crate) fn json_response(body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_for(uri: &str) -> Parts {
        let (parts, ()) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_question_from_query() {
        let parts = parts_for("/req?question=Who%20is%20Yoda%3F");
        assert_eq!(
            extract_question(&parts, &Bytes::new()).as_deref(),
            Some("Who is Yoda?")
        );
    }

    #[test]
    fn test_question_from_json_body() {
        let parts = parts_for("/req");
        let body = Bytes::from_static(br#"{"question": "What is a wookiee?"}"#);
        assert_eq!(
            extract_question(&parts, &body).as_deref(),
            Some("What is a wookiee?")
        );
    }

    #[test]
    fn test_query_wins_over_body() {
        let parts = parts_for("/req?question=from-query");
        let body = Bytes::from_static(br#"{"question": "from-body"}"#);
        assert_eq!(extract_question(&parts, &body).as_deref(), Some("from-query"));
    }

    #[test]
    fn test_invalid_body_is_ignored() {
        let parts = parts_for("/req");
        let body = Bytes::from_static(b"not json at all");
        assert_eq!(extract_question(&parts, &body), None);
    }

    #[test]
    fn test_blank_question_treated_as_absent() {
        let parts = parts_for("/req?question=%20%20");
        assert_eq!(extract_question(&parts, &Bytes::new()), None);
    }
}
