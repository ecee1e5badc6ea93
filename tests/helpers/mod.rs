#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::mpsc;

use buddy::config::CompanionConfig;
use buddy::kernel::context::CompanionContext;
use buddy::kernel::event::{InputEvent, TaskId, UiCommand};
use buddy::kernel::scheduler::SideEffect;
use buddy::kernel::time::Clock;
use buddy::notifications::NotificationState;
use buddy::services::llm::{shared, Assistant, CompletionProvider, ImageAttachment, LlmError, SharedAssistant};
use buddy::Reactor;

/// 2026-03-14 at `h:m` local time.
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    on(14, h, m)
}

/// 2026-03-`day` at `h:m` local time.
pub fn on(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn topic_json(topic: &str, message: &str) -> String {
    serde_json::json!({ "topic_key": topic, "message": message }).to_string()
}

/// A state store backed by a fresh temp dir. Keep the dir alive for the test.
pub fn temp_state() -> (tempfile::TempDir, Arc<NotificationState>) {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(NotificationState::open(dir.path().join("notification_state.json")));
    (dir, state)
}

pub fn test_config() -> CompanionConfig {
    CompanionConfig {
        api_key: "sk-ant-REDACTED".into(),
        ..CompanionConfig::default()
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
}

#[derive(Debug, Clone)]
pub struct AskRecord {
    pub question: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub history_len: usize,
}

#[derive(Debug, Default)]
pub struct ProbeLog {
    pub asks: Vec<AskRecord>,
    pub clears: usize,
    pub app_context: Option<String>,
}

/// Shared view into a [`FakeAssistant`] after it has been boxed away.
#[derive(Debug, Clone, Default)]
pub struct AssistantProbe(Arc<Mutex<ProbeLog>>);

impl AssistantProbe {
    pub fn asks(&self) -> Vec<AskRecord> {
        self.0.lock().unwrap().asks.clone()
    }

    pub fn ask_count(&self) -> usize {
        self.0.lock().unwrap().asks.len()
    }

    pub fn clears(&self) -> usize {
        self.0.lock().unwrap().clears
    }

    pub fn app_context(&self) -> Option<String> {
        self.0.lock().unwrap().app_context.clone()
    }
}

pub const BASE_PROMPT: &str = "You are a test buddy.";
pub const BASE_MAX_TOKENS: u32 = 1024;

/// Scripted assistant. Pops replies in order, then repeats the fallback.
pub struct FakeAssistant {
    script: VecDeque<Reply>,
    fallback: Reply,
    delay: Option<Duration>,
    system_prompt: String,
    max_tokens: u32,
    history: Vec<String>,
    probe: AssistantProbe,
}

impl FakeAssistant {
    pub fn always(text: impl Into<String>) -> Self {
        Self::scripted(Vec::new(), Reply::Text(text.into()))
    }

    pub fn failing() -> Self {
        Self::scripted(Vec::new(), Reply::Fail)
    }

    pub fn scripted(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: script.into(),
            fallback,
            delay: None,
            system_prompt: BASE_PROMPT.into(),
            max_tokens: BASE_MAX_TOKENS,
            history: Vec::new(),
            probe: AssistantProbe::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn probe(&self) -> AssistantProbe {
        self.probe.clone()
    }

    pub fn into_shared(self) -> (SharedAssistant, AssistantProbe) {
        let probe = self.probe();
        (shared(self), probe)
    }
}

#[async_trait]
impl Assistant for FakeAssistant {
    async fn ask(&mut self, question: &str, _image: Option<&ImageAttachment>) -> Result<String, LlmError> {
        self.probe.0.lock().unwrap().asks.push(AskRecord {
            question: question.to_string(),
            system_prompt: self.system_prompt.clone(),
            max_tokens: self.max_tokens,
            history_len: self.history.len(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.script.pop_front().unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Text(text) => {
                self.history.push(question.to_string());
                self.history.push(text.clone());
                Ok(text)
            }
            Reply::Fail => Err(LlmError::Tool("scripted failure".into())),
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
        self.probe.0.lock().unwrap().clears += 1;
    }

    fn set_app_context(&mut self, app_type: &str) {
        self.probe.0.lock().unwrap().app_context = Some(app_type.to_string());
    }
}

/// One-shot classifier with a fixed answer. `None` fails every call.
#[derive(Debug, Default)]
pub struct FakeClassifier {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for FakeClassifier {
    async fn complete(&self, _system: &str, _prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| LlmError::Api { status: 529, body: "overloaded".into() })
    }
}

/// Clock the test moves by hand.
#[derive(Debug)]
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

pub struct Harness {
    pub reactor: Reactor,
    pub inputs: mpsc::Sender<InputEvent>,
    pub ui: mpsc::Receiver<UiCommand>,
    pub clock: Arc<FixedClock>,
    pub probe: AssistantProbe,
    pub config_path: PathBuf,
    _dir: tempfile::TempDir,
}

/// Reactor over a temp dir, a scripted assistant and a hand-moved clock.
pub fn harness(
    config: CompanionConfig,
    assistant: FakeAssistant,
    classifier: Option<Arc<dyn CompletionProvider>>,
    now: NaiveDateTime,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let state = Arc::new(NotificationState::open(dir.path().join("notification_state.json")));
    let (assistant, probe) = assistant.into_shared();
    let ctx = CompanionContext::with_parts(config, config_path.clone(), state, assistant, classifier);

    let (input_tx, input_rx) = mpsc::channel(100);
    let (ui_tx, ui_rx) = mpsc::channel(100);
    let clock = FixedClock::new(now);
    let reactor = Reactor::new(ctx, input_rx, ui_tx, clock.clone());
    Harness {
        reactor,
        inputs: input_tx,
        ui: ui_rx,
        clock,
        probe,
        config_path,
        _dir: dir,
    }
}

pub fn ui_commands(effects: &[SideEffect]) -> Vec<UiCommand> {
    effects
        .iter()
        .filter_map(|e| match e {
            SideEffect::Ui(cmd) => Some(cmd.clone()),
            _ => None,
        })
        .collect()
}

pub fn wake_task(effects: &[SideEffect]) -> Option<TaskId> {
    effects.iter().find_map(|e| match e {
        SideEffect::SpawnWakeGreeting { task } => Some(*task),
        _ => None,
    })
}

pub fn turn_task(effects: &[SideEffect]) -> Option<(TaskId, String, String, bool)> {
    effects.iter().find_map(|e| match e {
        SideEffect::SpawnTurn {
            task,
            utterance,
            question,
            reset,
            ..
        } => Some((*task, utterance.clone(), question.clone(), *reset)),
        _ => None,
    })
}
