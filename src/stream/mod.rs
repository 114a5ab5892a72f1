pub mod sse;

pub use sse::{sse_frame_stream, SseParser};

/// Payload of the terminal SSE frame on OpenAI-style completion streams.
pub const SSE_DONE_PAYLOAD: &str = "[DONE]";

/// One fully-assembled SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// True for the `data: [DONE]` sentinel that terminates the stream.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data == SSE_DONE_PAYLOAD
    }
}
