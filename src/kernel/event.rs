use uuid::Uuid;

use super::context::AppContext;
use super::presence::{PetEvent, PetState};
use crate::intent::{ResponseMode, RouteDecision};
use crate::notifications::{Notification, SlotId};

/// Identifies one spawned model task. Results for unknown ids are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// External signals: hotkey, overlay input, console.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Activate { app: AppContext },
    Submit(String),
    Dismiss,
    Quit,
}

impl InputEvent {
    /// Console stand-in for the hotkey and overlay: `/wake [app]`, `/dismiss`,
    /// `/quit`; any other non-empty line is a submission.
    pub fn from_console(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        Some(match cmd {
            "/wake" => InputEvent::Activate {
                app: AppContext::new(rest.trim()),
            },
            "/dismiss" => InputEvent::Dismiss,
            "/quit" => InputEvent::Quit,
            _ => InputEvent::Submit(line.to_string()),
        })
    }
}

/// Results of spawned tasks, fed back into the reactor.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    WakeGreeting {
        task: TaskId,
        notification: Option<Notification>,
    },
    /// The wake greeting outlived the activation wait. Its result still
    /// follows as a `WakeGreeting`.
    WakeGreetingDelayed { task: TaskId },
    SlotGenerated {
        task: TaskId,
        slot: SlotId,
        notification: Option<Notification>,
    },
    TurnCompleted {
        task: TaskId,
        result: TurnResult,
        route: RouteDecision,
    },
}

/// What a conversational turn produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult {
    /// Answer with the mode the router picked for it.
    Structured { text: String, mode: ResponseMode },
    /// Bare text with no mode attached (errors, onboarding replies).
    Legacy(String),
}

impl TurnResult {
    pub fn text(&self) -> &str {
        match self {
            TurnResult::Structured { text, .. } => text,
            TurnResult::Legacy(text) => text,
        }
    }
}

/// Map a finished turn to the FSM event that leaves THINKING.
///
/// A structured result carries its own mode. A legacy result is casual only
/// when the conversation was opened by a greeting.
pub fn resolve_reply(result: &TurnResult, chat_mode: bool) -> (PetEvent, ResponseMode) {
    let mode = match result {
        TurnResult::Structured { mode, .. } => *mode,
        TurnResult::Legacy(_) if chat_mode => ResponseMode::Casual,
        TurnResult::Legacy(_) => ResponseMode::Work,
    };
    let event = match mode {
        ResponseMode::Casual => PetEvent::ChatAnswer,
        ResponseMode::Work => PetEvent::Answer,
    };
    (event, mode)
}

pub fn reply_hint(mode: ResponseMode) -> &'static str {
    match mode {
        ResponseMode::Work => "Esc close · Enter follow-up",
        ResponseMode::Casual => "Esc close · Enter continue chatting",
    }
}

/// Commands for whatever renders the companion.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    ShowAwake { window_title: String },
    ShowNotice {
        text: String,
        hint: String,
        status: String,
        pet_state: PetState,
    },
    ShowThinking,
    ShowReply {
        text: String,
        hint: String,
        mode: ResponseMode,
    },
    Rest,
}
