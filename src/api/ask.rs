//! `/req` — buffered question answering.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::request::Parts;
use tracing::Instrument;

use crate::completion::question_prompt;
use crate::state::AppState;
use crate::trace_context::operation_id_from_headers;

use super::{buffered_total_tokens, extract_question, text_response};

/// Answer a caller question with a single buffered completion.
///
/// Usage is reported exactly once from the upstream usage field, tagged
/// `streaming=false`. Upstream failures propagate as an HTTP error with
/// no usage event.
pub async fn handler(state: Arc<AppState>, parts: Parts, body: Bytes) -> Response {
    let operation_id = operation_id_from_headers(&parts.headers);
    let span = tracing::info_span!("chat-relay", route = "req", operation_id = %operation_id);

    async move {
        let question = extract_question(&parts, &body);
        let messages = question_prompt(question.as_deref());

        match state.client.complete(&messages).await {
            Ok(outcome) => {
                let total_tokens = buffered_total_tokens(&state, &outcome.completion);
                state.usage.report(total_tokens, &operation_id, false);
                text_response(outcome.completion.first_content().to_string())
            }
            Err(err) => {
                tracing::warn!("completion call failed: {err}");
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}
