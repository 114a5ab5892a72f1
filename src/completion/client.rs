//! Upstream chat-completion client.
//!
//! Wraps the hosted API behind two calls: a buffered completion and a
//! lazy chunk stream. Retry, backoff and auth token refresh are out of
//! scope; timeouts are this client's responsibility.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::RelayError;
use crate::stream::sse_frame_stream;

use super::{ChatCompletion, ChatCompletionChunk, ChatMessage};

const API_KEY_HEADER: &str = "api-key";

/// A parsed non-streaming completion together with the raw upstream body,
/// so JSON routes can relay the body byte-for-byte.
pub struct CompletionOutcome {
    pub completion: ChatCompletion,
    pub raw: Bytes,
}

pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: url::Url,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
}

impl CompletionClient {
    /// Build the client and precompute the deployment endpoint.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable endpoint or HTTP client construction error;
    /// both abort startup rather than surfacing per-request.
    pub fn new(upstream: &UpstreamConfig, server: &ServerConfig) -> Result<Self, RelayError> {
        let endpoint = build_endpoint(upstream)?;
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(server.http_pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(server.http_pool_idle_timeout_secs))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(server.timeout))
            .build()
            .map_err(|e| RelayError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            api_key: upstream.api_key.clone(),
            temperature: upstream.temperature,
            max_tokens: upstream.max_tokens,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        serde_json::json!({
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "n": 1,
            "top_p": 1,
            "frequency_penalty": 0,
            "presence_penalty": 0,
            "stream": stream,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&self.request_body(messages, stream));
        if !self.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, &self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Transport(format!("Upstream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                message: sanitize_upstream_error(&body),
            });
        }
        Ok(response)
    }

    /// Call the upstream with `stream=false` and return the full body.
    ///
    /// # Errors
    ///
    /// `RelayError::Upstream` for non-success statuses,
    /// `RelayError::Transport` for connection-level failures.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionOutcome, RelayError> {
        let response = self.send(messages, false).await?;
        let raw = response
            .bytes()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to read upstream body: {e}")))?;
        let completion = serde_json::from_slice(&raw).map_err(|e| RelayError::Upstream {
            status: 200,
            message: format!("Unparsable completion body: {e}"),
        })?;
        Ok(CompletionOutcome { completion, raw })
    }

    /// Call the upstream with `stream=true` and return the lazy chunk
    /// sequence: finite, non-restartable, consumed in one forward pass.
    ///
    /// Frames that are not valid chunk JSON are skipped with a debug log;
    /// the `[DONE]` sentinel terminates the sequence. Dropping the stream
    /// releases the underlying connection.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`complete`](Self::complete); errors can only
    /// occur before the first chunk is produced.
    pub async fn complete_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<impl Stream<Item = ChatCompletionChunk> + Send + 'static, RelayError> {
        let response = self.send(messages, true).await?;
        let frames = sse_frame_stream(response.bytes_stream());
        let chunks = frames
            .take_while(|frame| futures_util::future::ready(!frame.is_done()))
            .filter_map(|frame| {
                let chunk = match serde_json::from_str::<ChatCompletionChunk>(&frame.data) {
                    Ok(chunk) => Some(chunk),
                    Err(err) => {
                        tracing::debug!("skipping undecodable stream frame: {err}");
                        None
                    }
                };
                futures_util::future::ready(chunk)
            });
        Ok(chunks)
    }
}

fn build_endpoint(upstream: &UpstreamConfig) -> Result<url::Url, RelayError> {
    let base = upstream.api_base.trim_end_matches('/');
    let raw = format!(
        "{base}/openai/deployments/{deployment}/chat/completions?api-version={version}",
        deployment = upstream.deployment,
        version = upstream.api_version,
    );
    url::Url::parse(&raw)
        .map_err(|e| RelayError::Config(format!("Invalid upstream endpoint '{raw}': {e}")))
}

/// Reduce an upstream error body to a short, log-safe message.
pub(crate) fn sanitize_upstream_error(body: &[u8]) -> String {
    const MAX_LEN: usize = 500;

    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(msg) = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return truncate_message(msg, MAX_LEN);
        }
    }

    let text = String::from_utf8_lossy(body);
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    truncate_message(cleaned.trim(), MAX_LEN)
}

fn truncate_message(msg: &str, max_len: usize) -> String {
    if msg.len() > max_len {
        let mut end = max_len;
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &msg[..end])
    } else {
        msg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            api_base: "https://example.openai.azure.com/".to_string(),
            deployment: "gpt-test".to_string(),
            api_key: String::new(),
            api_version: "2023-09-01-preview".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    #[test]
    fn test_endpoint_layout() {
        let url = build_endpoint(&upstream()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.openai.azure.com/openai/deployments/gpt-test/chat/completions?api-version=2023-09-01-preview"
        );
    }

    #[test]
    fn test_sanitize_extracts_error_message() {
        let body = br#"{"error": {"message": "The API deployment does not exist", "code": "404"}}"#;
        assert_eq!(
            sanitize_upstream_error(body),
            "The API deployment does not exist"
        );
    }

    #[test]
    fn test_sanitize_truncates_and_strips_controls() {
        let noisy = "bad\nthings\thappened".as_bytes();
        let sanitized = sanitize_upstream_error(noisy);
        assert!(!sanitized.contains('\n'));

        let long = "x".repeat(600);
        let sanitized = sanitize_upstream_error(long.as_bytes());
        assert!(sanitized.len() <= 503);
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn test_request_body_shape() {
        let client = CompletionClient::new(&upstream(), &crate::config::ServerConfig::default())
            .expect("client should build");
        let body = client.request_body(&crate::completion::question_prompt(None), true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["n"], 1);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(
            body["messages"][1]["content"],
            crate::completion::DEFAULT_QUESTION
        );
    }
}
