use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use super::presence::CompanionFsm;
use crate::config::CompanionConfig;
use crate::intent::IntentRouter;
use crate::notifications::{DailyChatSource, NotificationManager, NotificationState};
use crate::services::llm::{
    shared, ClaudeAssistant, ClaudeClient, CompletionProvider, DisabledSearch, SharedAssistant,
};

/// The window the user woke the companion over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppContext {
    /// Classified app kind (`gmail`, `vscode`, ...). Empty when unknown.
    pub app_type: String,
    pub label: String,
    pub window_title: String,
}

impl AppContext {
    pub fn new(app_type: impl Into<String>) -> Self {
        let app_type = app_type.into().trim().to_lowercase();
        let label = if app_type.is_empty() {
            "Unknown".to_string()
        } else {
            app_type.clone()
        };
        Self {
            app_type,
            label,
            window_title: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = title.into();
        self
    }

    pub fn is_known(&self) -> bool {
        !self.app_type.is_empty() && self.app_type != "unknown"
    }

    pub fn display_title(&self) -> String {
        if self.window_title.is_empty() {
            self.label.clone()
        } else {
            format!("{} - {}", self.label, self.window_title)
        }
    }

    /// Bracketed preamble prepended to a question asked over this window.
    pub fn context_prompt(&self) -> Option<String> {
        if !self.is_known() {
            return None;
        }
        let mut parts = vec![format!("Active app: {}", self.label)];
        if !self.window_title.is_empty() {
            parts.push(format!("Window title: {}", self.window_title));
        }
        if let Some(tip) = app_tip(&self.app_type) {
            parts.push(format!("Tip: {}", tip));
        }
        Some(parts.join("\n"))
    }

    pub fn frame_question(&self, question: &str) -> String {
        match self.context_prompt() {
            Some(ctx) => format!("[{}]\n\n{}", ctx, question),
            None => question.to_string(),
        }
    }
}

/// Everything the orchestrator mutates or consults, built once at startup and
/// handed to the reactor.
pub struct CompanionContext {
    pub config: CompanionConfig,
    pub config_path: PathBuf,
    pub state: Arc<NotificationState>,
    pub fsm: CompanionFsm,
    pub daily: Arc<DailyChatSource>,
    pub manager: Arc<NotificationManager>,
    pub assistant: SharedAssistant,
    /// One-shot model for the router fallback. `None` means rules only.
    pub classifier: Option<Arc<dyn CompletionProvider>>,
    pub router: Arc<IntentRouter>,
    pub app: AppContext,
    pub onboarding: bool,
    /// The current conversation was opened by a greeting.
    pub chat_mode: bool,
}

impl CompanionContext {
    /// Wire the production collaborators from `config`.
    pub fn from_config(config: CompanionConfig, config_path: PathBuf) -> Self {
        let state = Arc::new(NotificationState::open(config.resolved_state_path()));
        let (assistant, client) = build_claude(&config);
        let classifier: Option<Arc<dyn CompletionProvider>> = if client.has_key() {
            Some(Arc::new(client))
        } else {
            None
        };
        Self::with_parts(config, config_path, state, shared(assistant), classifier)
    }

    pub fn with_parts(
        config: CompanionConfig,
        config_path: PathBuf,
        state: Arc<NotificationState>,
        assistant: SharedAssistant,
        classifier: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        let daily = Arc::new(DailyChatSource::new(config.daily_chat.clone(), assistant.clone()));
        let mut manager = NotificationManager::new(state.clone());
        manager.register(daily.clone());
        let router = Arc::new(IntentRouter::new(config.router.clone()));
        let onboarding = config.needs_onboarding();
        Self {
            config,
            config_path,
            state,
            fsm: CompanionFsm::new(),
            daily,
            manager: Arc::new(manager),
            assistant,
            classifier,
            router,
            app: AppContext::default(),
            onboarding,
            chat_mode: false,
        }
    }
}

pub fn build_claude(config: &CompanionConfig) -> (ClaudeAssistant, ClaudeClient) {
    let client = ClaudeClient::new(config.api_key.clone(), config.model.clone(), config.api_base.clone());
    let assistant = ClaudeAssistant::new(client.clone(), Arc::new(DisabledSearch), config.max_tokens);
    (assistant, client)
}

fn app_tip(app_type: &str) -> Option<&'static str> {
    Some(match app_type {
        "gmail" => "This is an email. Note the sender, subject, and body content.",
        "outlook" => "This is an Outlook email. Note the sender, subject, and body content.",
        "browser" => "This is a browser page. Focus on the main content of the page.",
        "vscode" => "This is a code editor. Focus on code content, filenames, and error messages.",
        "terminal" => "This is a terminal/command line. Focus on command output and error messages.",
        "slack" => "This is a Slack message. Note the conversation content and sender.",
        "discord" => "This is a Discord message. Note the conversation content and channel.",
        "excel" => "This is an Excel spreadsheet. Focus on data content and formulas.",
        "word" => "This is a Word document. Focus on document content.",
        "powerpoint" => "This is a PowerPoint presentation. Focus on slide content.",
        "pdf_reader" => "This is a PDF document. Focus on document content.",
        _ => return None,
    })
}
