//! `/cities` and `/stream-cities` — fixed-prompt demo routes.

use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use tracing::Instrument;

use crate::completion::cities_prompt;
use crate::state::AppState;
use crate::trace_context::operation_id_from_headers;

use super::streaming::MeteredRelayStream;
use super::{buffered_total_tokens, json_response};

/// Buffered cities completion, relayed as the upstream JSON body.
pub async fn cities_handler(state: Arc<AppState>, parts: Parts) -> Response {
    let operation_id = operation_id_from_headers(&parts.headers);
    let span = tracing::info_span!("chat-relay", route = "cities", operation_id = %operation_id);

    async move {
        match state.client.complete(&cities_prompt()).await {
            Ok(outcome) => {
                let total_tokens = buffered_total_tokens(&state, &outcome.completion);
                state.usage.report(total_tokens, &operation_id, false);
                json_response(outcome.raw)
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

/// Streamed cities completion: content deltas are forwarded as they
/// arrive and token usage is accounted once when the stream ends.
///
/// An upstream failure before the first chunk propagates as an HTTP
/// error with no usage event; after that, the response status is already
/// committed and the body simply ends.
pub async fn stream_cities_handler(state: Arc<AppState>, parts: Parts) -> Response {
    let operation_id = operation_id_from_headers(&parts.headers);
    let span = tracing::info_span!(
        "chat-relay",
        route = "stream-cities",
        operation_id = %operation_id
    );

    async move {
        match state.client.complete_stream(&cities_prompt()).await {
            Ok(chunks) => {
                let metered = MeteredRelayStream::new(
                    chunks,
                    state.usage.clone(),
                    operation_id,
                    state.config.telemetry.token_encoding.clone(),
                );
                let mut response = Response::new(Body::from_stream(metered));
                let headers = response.headers_mut();
                headers.insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("text/event-stream"),
                );
                headers.insert(
                    http::header::CACHE_CONTROL,
                    http::HeaderValue::from_static("no-cache"),
                );
                response
            }
            Err(err) => {
                tracing::warn!("streaming completion call failed: {err}");
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}
