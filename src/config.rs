use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::services::llm::client::{DEFAULT_API_BASE, DEFAULT_MODEL};

pub const DEFAULT_PUSH_TIMES: [&str; 2] = ["15:00", "20:00"];
pub const DEFAULT_MAX_TOPIC_RETRY: i64 = 3;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompanionConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_base: String,
    pub log_level: String,
    /// Seconds between scheduler polls for timed slots.
    pub poll_interval_secs: u64,
    /// How long an activation waits for the first greeting of the day before
    /// waking without it.
    pub greeting_wait_ms: u64,
    /// Overrides the notification state file location.
    pub state_path: Option<String>,
    pub hotkey_activate: String,
    pub hotkey_quit: String,
    pub onboarding_done: bool,
    pub daily_chat: DailyChatConfig,
    pub router: RouterConfig,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
            max_tokens: 1024,
            api_base: DEFAULT_API_BASE.into(),
            log_level: "info".into(),
            poll_interval_secs: 30,
            greeting_wait_ms: 4_000,
            state_path: None,
            hotkey_activate: "ctrl+shift+space".into(),
            hotkey_quit: "ctrl+shift+q".into(),
            onboarding_done: false,
            daily_chat: DailyChatConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

/// Daily proactive chat settings. Parsed leniently: malformed values fall back
/// to defaults instead of failing the whole config.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyChatConfig {
    pub enabled: bool,
    pub push_times: Vec<String>,
    pub max_topic_retry: i64,
}

impl Default for DailyChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            push_times: DEFAULT_PUSH_TIMES.iter().map(|s| s.to_string()).collect(),
            max_topic_retry: DEFAULT_MAX_TOPIC_RETRY,
        }
    }
}

impl DailyChatConfig {
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        match value {
            Value::Object(obj) => Self {
                enabled: obj.get("enabled").map_or(true, truthy),
                push_times: match obj.get("push_times") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.trim().to_string(),
                            other => other.to_string(),
                        })
                        .collect(),
                    _ => defaults.push_times,
                },
                max_topic_retry: obj
                    .get("max_topic_retry")
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_MAX_TOPIC_RETRY),
            },
            Value::Bool(enabled) => Self {
                enabled: *enabled,
                ..defaults
            },
            Value::Null => Self {
                enabled: false,
                ..defaults
            },
            _ => defaults,
        }
    }

    /// Target times for `(afternoon_1500, evening_2000)`. Fewer than two
    /// configured entries means the defaults, entirely.
    pub fn timed_schedule(&self) -> [String; 2] {
        if self.push_times.len() < 2 {
            return DEFAULT_PUSH_TIMES.map(str::to_string);
        }
        [self.push_times[0].clone(), self.push_times[1].clone()]
    }

    pub fn retry_limit(&self) -> usize {
        self.max_topic_retry.max(1) as usize
    }
}

/// Loose truthiness for hand-edited flags: `0`, `""`, `[]`, `{}` and `null`
/// are all off.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

impl<'de> Deserialize<'de> for DailyChatConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Product-tuned constants of the response-mode router.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    pub work_apps: Vec<String>,
    pub work_keywords: Vec<String>,
    pub casual_keywords: Vec<String>,
    pub rule_gap_threshold: i32,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            work_apps: owned(&[
                "gmail", "outlook", "slack", "vscode", "terminal", "excel", "word", "powerpoint",
            ]),
            work_keywords: owned(&[
                "email", "deadline", "review", "task", "ticket", "issue", "bug", "fix", "meeting",
                "report", "proposal", "client", "deploy", "production", "error", "work", "项目",
                "工作", "邮件", "修复", "上线", "报错",
            ]),
            casual_keywords: owned(&[
                "hi", "hello", "thanks", "thank you", "how are you", "joke", "chat", "haha",
                "lol", "good morning", "good night", "闲聊", "你好", "谢谢", "哈哈",
            ]),
            rule_gap_threshold: 2,
        }
    }
}

/// Returns `$BUDDY_HOME`, or `<config dir>/buddy`.
pub fn default_buddy_dir() -> PathBuf {
    if let Ok(home) = std::env::var("BUDDY_HOME") {
        return PathBuf::from(home);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("buddy")
}

pub fn default_config_path() -> PathBuf {
    default_buddy_dir().join("config.json")
}

impl CompanionConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from `path` (defaults when absent), then apply env overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).context("failed to read config file")?;
            serde_json::from_str(&contents).context("failed to parse config JSON")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CompanionConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// `ANTHROPIC_API_KEY` fills an empty key; `BUDDY_LOG_LEVEL` wins over the file.
    fn apply_env_overrides(&mut self) {
        if self.api_key.trim().is_empty() {
            if let Ok(val) = std::env::var("ANTHROPIC_API_KEY") {
                self.api_key = val;
            }
        }
        if let Ok(val) = std::env::var("BUDDY_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    pub fn needs_onboarding(&self) -> bool {
        self.api_key.trim().is_empty()
    }

    pub fn resolved_state_path(&self) -> PathBuf {
        match &self.state_path {
            Some(p) => PathBuf::from(p),
            None => default_buddy_dir().join("notification_state.json"),
        }
    }
}

/// Persist a freshly entered API key, keeping every other key in the file.
pub fn save_api_key(path: impl AsRef<Path>, api_key: &str) -> Result<()> {
    let path = path.as_ref();
    let mut doc = if path.exists() {
        let contents = std::fs::read_to_string(path).context("failed to read config file")?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    } else {
        Map::new()
    };
    doc.insert("api_key".into(), Value::String(api_key.to_string()));
    doc.insert("onboarding_done".into(), Value::Bool(true));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create config dir")?;
    }
    let json = serde_json::to_string_pretty(&Value::Object(doc))?;
    std::fs::write(path, json).context("failed to write config file")?;
    Ok(())
}
