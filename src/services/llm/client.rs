use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::prompts::{app_prompt, SYSTEM_PROMPT};
use super::search::{format_results, search_tool_definition, WebSearch, SEARCH_TOOL_NAME};
use super::{Assistant, CompletionProvider, ImageAttachment, LlmError};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOOL_ROUNDS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    pub fn wants_tool(&self) -> bool {
        self.stop_reason.as_deref() == Some("tool_use")
    }

    /// All text blocks, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Thin Messages API client. Cheap to clone.
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for ClaudeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub async fn create_message(&self, request: &MessagesRequest) -> Result<MessagesResponse, LlmError> {
        if !self.has_key() {
            return Err(LlmError::MissingApiKey);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
        info!(
            "Tokens: input={}, output={}",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );
        Ok(parsed)
    }
}

#[async_trait]
impl CompletionProvider for ClaudeClient {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            system: system.to_string(),
            tools: Vec::new(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![ContentBlock::Text {
                    text: prompt.to_string(),
                }],
            }],
        };
        let response = self.create_message(&request).await?;
        Ok(response.texts().join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    pub image: Option<ImageAttachment>,
}

/// Conversational companion backed by [`ClaudeClient`], with web search as
/// its only tool.
pub struct ClaudeAssistant {
    client: ClaudeClient,
    search: Arc<dyn WebSearch>,
    system_prompt: String,
    max_tokens: u32,
    history: Vec<ChatTurn>,
    app_type: String,
}

impl ClaudeAssistant {
    pub fn new(client: ClaudeClient, search: Arc<dyn WebSearch>, max_tokens: u32) -> Self {
        Self {
            client,
            search,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_tokens,
            history: Vec::new(),
            app_type: String::new(),
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn full_system_prompt(&self) -> String {
        let mut prompt = self.system_prompt.clone();
        if let Some(addition) = app_prompt(&self.app_type) {
            prompt.push_str("\n\n## Current context\n");
            prompt.push_str(addition);
        }
        prompt.push_str(&format!(
            "\n\nCurrent local time: {}",
            Local::now().format("%Y-%m-%d %H:%M (%A)")
        ));
        prompt
    }

    fn request(&self, messages: Vec<Message>) -> MessagesRequest {
        MessagesRequest {
            model: self.client.model().to_string(),
            max_tokens: self.max_tokens,
            system: self.full_system_prompt(),
            tools: vec![search_tool_definition()],
            messages,
        }
    }

    async fn converse(&self) -> Result<String, LlmError> {
        let mut messages = build_messages(&self.history);
        info!(
            "Sending request (model={}, max_tokens={}, history={})",
            self.client.model(),
            self.max_tokens,
            self.history.len()
        );
        let mut response = self.client.create_message(&self.request(messages.clone())).await?;

        if !response.wants_tool() {
            return Ok(response.texts().first().map(|t| t.to_string()).unwrap_or_default());
        }

        for round in 1..=MAX_TOOL_ROUNDS {
            let mut results = Vec::new();
            for block in &response.content {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    info!("Tool call [round {}]: {}({})", round, name, input);
                    if name == SEARCH_TOOL_NAME {
                        let query = input.get("query").and_then(Value::as_str).unwrap_or_default();
                        let hits = match self.search.search(query).await {
                            Ok(hits) => hits,
                            Err(e) => {
                                warn!("Search failed: {}", e);
                                Vec::new()
                            }
                        };
                        results.push(ContentBlock::ToolResult {
                            tool_use_id: id.clone(),
                            content: format_results(&hits),
                        });
                    }
                }
            }
            if results.is_empty() {
                break;
            }

            messages.push(Message {
                role: "assistant".to_string(),
                content: response.content.clone(),
            });
            messages.push(Message {
                role: "user".to_string(),
                content: results,
            });
            response = self.client.create_message(&self.request(messages.clone())).await?;
            if !response.wants_tool() {
                break;
            }
        }

        let texts = response.texts();
        if texts.is_empty() {
            Ok("(No response after search)".to_string())
        } else {
            Ok(texts.join("\n"))
        }
    }
}

/// Convert history into API messages. Only the latest user turn carries its
/// screenshot; older images are dropped to keep requests small.
pub fn build_messages(history: &[ChatTurn]) -> Vec<Message> {
    let latest_user = history.iter().rposition(|t| t.role == Role::User);
    history
        .iter()
        .enumerate()
        .map(|(i, turn)| match turn.role {
            Role::User => {
                let mut content = Vec::new();
                if Some(i) == latest_user {
                    if let Some(img) = &turn.image {
                        content.push(ContentBlock::Image {
                            source: ImageSource {
                                kind: "base64".to_string(),
                                media_type: img.media_type.clone(),
                                data: img.data.clone(),
                            },
                        });
                    }
                }
                content.push(ContentBlock::Text {
                    text: turn.text.clone(),
                });
                Message {
                    role: "user".to_string(),
                    content,
                }
            }
            Role::Assistant => Message {
                role: "assistant".to_string(),
                content: vec![ContentBlock::Text {
                    text: turn.text.clone(),
                }],
            },
        })
        .collect()
}

#[async_trait]
impl Assistant for ClaudeAssistant {
    async fn ask(&mut self, question: &str, image: Option<&ImageAttachment>) -> Result<String, LlmError> {
        self.history.push(ChatTurn {
            role: Role::User,
            text: question.to_string(),
            image: image.cloned(),
        });

        match self.converse().await {
            Ok(answer) => {
                self.history.push(ChatTurn {
                    role: Role::Assistant,
                    text: answer.clone(),
                    image: None,
                });
                Ok(answer)
            }
            Err(e) => {
                warn!("Claude API error: {}", e);
                self.history.pop();
                Err(e)
            }
        }
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = prompt;
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = max_tokens;
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }

    fn set_app_context(&mut self, app_type: &str) {
        self.app_type = app_type.to_string();
    }
}
