//! SSE (Server-Sent Events) frame parsing over a byte stream.
//!
//! Handles buffering of partial lines and field semantics per the
//! [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html):
//! chunks may arrive at arbitrary byte boundaries, including inside a
//! UTF-8 sequence.

use bytes::Bytes;
use futures_util::Stream;
use memchr::memchr_iter;

use super::SseEvent;

/// Incremental SSE line parser.
///
/// Feed it raw text chunks and it yields fully-assembled [`SseEvent`]
/// frames once their terminating blank line arrives.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
    last_event_id: Option<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any complete events parsed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    ///
    /// SSE field rules:
    /// - `data:` lines append to the data buffer; multiple lines join with `\n`
    /// - `event:` sets the event type for the next frame
    /// - `id:` sets the last event id
    /// - a blank line dispatches the pending frame
    /// - `:` comment lines and unknown fields are ignored
    /// - exactly one leading space after the colon is stripped
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut consumed = 0;
        let bytes = self.buffer.as_bytes();
        for newline_pos in memchr_iter(b'\n', bytes) {
            let mut line = &self.buffer[consumed..newline_pos];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                &mut self.last_event_id,
                out,
            );
            consumed = newline_pos + 1;
        }
        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        last_event_id: &mut Option<String>,
        events: &mut Vec<SseEvent>,
    ) {
        if line.is_empty() {
            if *has_data {
                events.push(SseEvent {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                    id: last_event_id.clone(),
                });
                *has_data = false;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *last_event_id = Some(value.to_string());
        }
        // retry: and unknown field names are ignored
    }
}

/// Turn an upstream byte stream into a stream of parsed SSE frames.
///
/// Transport errors end the frame stream; the caller observes plain
/// termination. Bytes split mid-UTF-8-sequence are held back until the
/// rest of the sequence arrives.
pub fn sse_frame_stream<S, E>(byte_stream: S) -> impl Stream<Item = SseEvent> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    struct FrameState<S> {
        stream: std::pin::Pin<Box<S>>,
        parser: SseParser,
        remainder: Vec<u8>,
        pending: std::collections::VecDeque<SseEvent>,
        done: bool,
    }

    futures_util::stream::unfold(
        FrameState {
            stream: Box::pin(byte_stream),
            parser: SseParser::new(),
            remainder: Vec::new(),
            pending: std::collections::VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.done {
                    return None;
                }

                match state.stream.as_mut().next().await {
                    None => {
                        state.done = true;
                    }
                    Some(Err(err)) => {
                        tracing::debug!("upstream byte stream error: {err}");
                        state.done = true;
                    }
                    Some(Ok(bytes)) => {
                        state.remainder.extend_from_slice(&bytes);
                        let mut parsed = Vec::new();
                        match std::str::from_utf8(&state.remainder) {
                            Ok(text) => {
                                state.parser.feed_into(text, &mut parsed);
                                state.remainder.clear();
                            }
                            Err(e) => {
                                let valid_up_to = e.valid_up_to();
                                if valid_up_to > 0 {
                                    // Checked boundary: valid_up_to always
                                    // sits on a UTF-8 character edge.
                                    let text = std::str::from_utf8(&state.remainder[..valid_up_to])
                                        .unwrap_or("");
                                    state.parser.feed_into(text, &mut parsed);
                                    state.remainder.drain(..valid_up_to);
                                }
                            }
                        }
                        state.pending.extend(parsed);
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_single_frame() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn test_frame_split_across_feeds() {
        let mut parser = SseParser::new();
        assert!(parser.feed("da").is_empty());
        assert!(parser.feed("ta: par").is_empty());
        let events = parser.feed("tial\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn test_crlf_lines() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn test_multiline_data_joined_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: first\ndata: second\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn test_event_type_and_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keepalive\nevent: delta\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_blank_line_without_data_emits_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed("\n\n\n").is_empty());
    }

    #[test]
    fn test_done_sentinel() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: [DONE]\n\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
    }

    #[tokio::test]
    async fn test_frame_stream_reassembles_arbitrary_chunking() {
        let payload = "data: {\"a\":1}\n\ndata: caf\u{e9}\n\ndata: [DONE]\n\n";
        let raw = payload.as_bytes();
        // Split inside the two-byte UTF-8 sequence of 'é'.
        let chunks: Vec<Result<Bytes, std::convert::Infallible>> = raw
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let byte_stream = futures_util::stream::iter(chunks);

        let events: Vec<SseEvent> = sse_frame_stream(byte_stream).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[1].data, "caf\u{e9}");
        assert!(events[2].is_done());
    }
}
