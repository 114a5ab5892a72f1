//! Streaming relay with exactly-once usage accounting.
//!
//! Each upstream content delta is forwarded to the caller as soon as it
//! arrives and appended to a local accumulator. When the upstream
//! sequence ends the accumulated text is token-counted once and reported
//! once. If the caller disconnects mid-stream, dropping the response body
//! drops this adapter; the drop guard reports the partial accumulator so
//! tokens the upstream already generated are still accounted, and the
//! upstream connection is released by dropping the inner stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;

use crate::completion::ChatCompletionChunk;
use crate::observability::token_counter::count_tokens;
use crate::observability::usage::UsageReporter;

pin_project! {
    /// Adapter from upstream chunks to HTTP body bytes, with usage
    /// accounting folded in.
    pub struct MeteredRelayStream<S> {
        #[pin]
        inner: S,
        accumulator: String,
        reporter: UsageReporter,
        operation_id: String,
        encoding: String,
        reported: bool,
    }

    impl<S> PinnedDrop for MeteredRelayStream<S> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            report_once(
                this.reported,
                this.accumulator,
                this.reporter,
                this.operation_id,
                this.encoding,
            );
        }
    }
}

impl<S> MeteredRelayStream<S> {
    pub fn new(
        inner: S,
        reporter: UsageReporter,
        operation_id: String,
        encoding: String,
    ) -> Self {
        Self {
            inner,
            accumulator: String::new(),
            reporter,
            operation_id,
            encoding,
            reported: false,
        }
    }
}

fn report_once(
    reported: &mut bool,
    accumulator: &str,
    reporter: &UsageReporter,
    operation_id: &str,
    encoding: &str,
) {
    if *reported {
        return;
    }
    *reported = true;
    match count_tokens(accumulator, encoding) {
        Ok(total_tokens) => reporter.report(total_tokens, operation_id, true),
        Err(err) => tracing::warn!("token counting failed, usage not recorded: {err}"),
    }
}

impl<S> Stream for MeteredRelayStream<S>
where
    S: Stream<Item = ChatCompletionChunk>,
{
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(chunk)) => {
                    let Some(delta) = chunk.content_delta() else {
                        // Role-only and finish-reason chunks carry no text.
                        continue;
                    };
                    this.accumulator.push_str(delta);
                    return Poll::Ready(Some(Ok(Bytes::copy_from_slice(delta.as_bytes()))));
                }
                Poll::Ready(None) => {
                    report_once(
                        this.reported,
                        this.accumulator,
                        this.reporter,
                        this.operation_id,
                        this.encoding,
                    );
                    return Poll::Ready(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn chunk(content: &str) -> ChatCompletionChunk {
        serde_json::from_value(serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": content}}]
        }))
        .unwrap()
    }

    fn empty_chunk() -> ChatCompletionChunk {
        serde_json::from_value(serde_json::json!({
            "choices": [{"index": 0, "delta": {"role": "assistant"}}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_forwarded_bytes_match_accounted_text() {
        let reporter = UsageReporter::new("test");
        let upstream = futures_util::stream::iter(vec![
            empty_chunk(),
            chunk("Hello"),
            chunk(" world"),
            chunk("!"),
        ]);
        let relayed = MeteredRelayStream::new(
            upstream,
            reporter.clone(),
            "abc123".to_string(),
            "cl100k_base".to_string(),
        );

        let forwarded: Vec<Bytes> = relayed.map(|r| r.unwrap()).collect().await;
        let body: Vec<u8> = forwarded.concat();
        assert_eq!(body, b"Hello world!");

        let totals = reporter.totals();
        assert_eq!(totals.events, 1);
        assert_eq!(
            totals.total_tokens,
            count_tokens("Hello world!", "cl100k_base").unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_stream_still_reports_once() {
        let reporter = UsageReporter::new("test");
        let upstream = futures_util::stream::iter(Vec::<ChatCompletionChunk>::new());
        let relayed = MeteredRelayStream::new(
            upstream,
            reporter.clone(),
            String::new(),
            "cl100k_base".to_string(),
        );
        let forwarded: Vec<_> = relayed.collect().await;
        assert!(forwarded.is_empty());

        let totals = reporter.totals();
        assert_eq!(totals.events, 1);
        assert_eq!(totals.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_drop_mid_stream_reports_partial_usage() {
        let reporter = UsageReporter::new("test");
        let upstream = futures_util::stream::iter(vec![chunk("partial"), chunk(" tail")]);
        let mut relayed = Box::pin(MeteredRelayStream::new(
            upstream,
            reporter.clone(),
            "abc123".to_string(),
            "cl100k_base".to_string(),
        ));

        // Pull one chunk, then simulate client disconnect by dropping.
        let first = relayed.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"partial");
        drop(relayed);

        let totals = reporter.totals();
        assert_eq!(totals.events, 1);
        assert_eq!(
            totals.total_tokens,
            count_tokens("partial", "cl100k_base").unwrap()
        );
    }

    #[tokio::test]
    async fn test_exhausted_then_dropped_reports_only_once() {
        let reporter = UsageReporter::new("test");
        let upstream = futures_util::stream::iter(vec![chunk("one")]);
        let mut relayed = Box::pin(MeteredRelayStream::new(
            upstream,
            reporter.clone(),
            String::new(),
            "cl100k_base".to_string(),
        ));
        while relayed.next().await.is_some() {}
        drop(relayed);

        assert_eq!(reporter.totals().events, 1);
    }
}
