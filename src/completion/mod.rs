//! Chat-completion wire types and prompt construction.

pub mod client;

pub use client::CompletionClient;

use serde::{Deserialize, Serialize};

/// System instruction for the question-answering route.
pub const QA_SYSTEM_PROMPT: &str = "You are an AI assistant that helps people find information about \"Star Wars\".\n\nInstructions\n- only answer questions related to Star Wars\n- If an answer is not related to Star Wars, respond with \"This is not the AI you are looking for...\"";

/// Fallback question when the caller supplies none.
pub const DEFAULT_QUESTION: &str = "What is blue milk?";

/// Prompt for the cities demo routes.
pub const CITIES_PROMPT: &str = "List the 100 most populous cities in the United States.";

const CITIES_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One prompt message. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }
}

/// Two-message prompt for the question route: system instruction plus the
/// caller's question, defaulting when the question is absent.
#[must_use]
pub fn question_prompt(question: Option<&str>) -> Vec<ChatMessage> {
    let question = match question {
        Some(q) if !q.trim().is_empty() => q,
        _ => DEFAULT_QUESTION,
    };
    vec![
        ChatMessage::system(QA_SYSTEM_PROMPT),
        ChatMessage::user(question),
    ]
}

/// Two-message prompt for the cities routes.
#[must_use]
pub fn cities_prompt() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CITIES_SYSTEM_PROMPT),
        ChatMessage::user(CITIES_PROMPT),
    ]
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A buffered chat completion as returned by the upstream API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Content of the first choice, empty when the upstream sent none.
    #[must_use]
    pub fn first_content(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One unit of a streamed completion. Consumed exactly once: forwarded to
/// the caller and folded into the token accumulator.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// The content delta carried by this chunk, if any. Role-only and
    /// finish-reason-only chunks carry none.
    #[must_use]
    pub fn content_delta(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}
