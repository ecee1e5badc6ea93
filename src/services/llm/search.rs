use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::LlmError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search backend used to answer `web_search` tool calls.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, LlmError>;
}

/// Backend that never finds anything. The model is told so and answers from
/// what it already knows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSearch;

#[async_trait]
impl WebSearch for DisabledSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, LlmError> {
        Ok(Vec::new())
    }
}

pub const SEARCH_TOOL_NAME: &str = "web_search";

/// Tool definition advertised to the model.
pub fn search_tool_definition() -> Value {
    json!({
        "name": SEARCH_TOOL_NAME,
        "description": "Search the web for current information. Use this when you need to \
            verify facts, look up documentation, find recent news, or when the user's \
            question requires information you're not sure about.",
        "input_schema": {
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" }
            },
            "required": ["query"]
        }
    })
}

/// Render hits as the tool result text handed back to the model.
pub fn format_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    hits.iter()
        .map(|h| format!("• {}\n  {}\n  {}", h.title, h.snippet, h.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}
