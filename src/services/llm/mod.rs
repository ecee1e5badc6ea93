pub mod client;
pub mod guard;
pub mod prompts;
pub mod search;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use client::{ClaudeAssistant, ClaudeClient};
pub use guard::PromptOverride;
pub use search::{DisabledSearch, SearchHit, WebSearch};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("no API key configured")]
    MissingApiKey,
    #[error("tool error: {0}")]
    Tool(String),
}

/// Screenshot already cropped and encoded by the capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub media_type: String,
    /// Base64 payload.
    pub data: String,
}

/// Stateful conversational model. Holds history, a mutable system prompt and a
/// token budget. Tool-call rounds (web search) happen inside `ask`.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn ask(&mut self, question: &str, image: Option<&ImageAttachment>) -> Result<String, LlmError>;

    fn system_prompt(&self) -> &str;
    fn set_system_prompt(&mut self, prompt: String);

    fn max_tokens(&self) -> u32;
    fn set_max_tokens(&mut self, max_tokens: u32);

    fn clear_history(&mut self);

    /// App classification of the focused window, used to specialize the prompt.
    fn set_app_context(&mut self, _app_type: &str) {}
}

/// Stateless one-shot completion. Never touches conversation history or the
/// overridable system prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}

/// The single assistant instance. The mutex is held for the whole of a
/// generation so temporary prompt overrides are never observed by another call.
pub type SharedAssistant = Arc<Mutex<Box<dyn Assistant>>>;

pub fn shared(assistant: impl Assistant + 'static) -> SharedAssistant {
    Arc::new(Mutex::new(Box::new(assistant)))
}
