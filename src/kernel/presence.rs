use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::kernel::time::{Tick, ALERT_DISMISS_MS, AUTO_REST_MS};

/// The companion's visible posture. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetState {
    /// Default idle. The only posture from which proactive content may interrupt.
    Resting,
    /// Daily proactive opener on screen, input open.
    Greeting,
    /// Urgent proactive notification, bubble only.
    Alert,
    /// Summoned by the user, waiting for a question.
    Awake,
    /// Model call in flight.
    Thinking,
    /// Work-mode answer on screen.
    Reply,
    /// Casual answer after small talk or a greeting.
    IdleChat,
}

impl PetState {
    pub const ALL: [PetState; 7] = [
        PetState::Resting,
        PetState::Greeting,
        PetState::Alert,
        PetState::Awake,
        PetState::Thinking,
        PetState::Reply,
        PetState::IdleChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PetState::Resting => "resting",
            PetState::Greeting => "greeting",
            PetState::Alert => "alert",
            PetState::Awake => "awake",
            PetState::Thinking => "thinking",
            PetState::Reply => "reply",
            PetState::IdleChat => "idle_chat",
        }
    }
}

impl Default for PetState {
    fn default() -> Self {
        Self::Resting
    }
}

impl fmt::Display for PetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that request a posture change. Requests, not commands: the
/// transition table decides whether they apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetEvent {
    Activate,
    Greet,
    Alert,
    Submit,
    Answer,
    ChatAnswer,
    Dismiss,
}

impl PetEvent {
    pub const ALL: [PetEvent; 7] = [
        PetEvent::Activate,
        PetEvent::Greet,
        PetEvent::Alert,
        PetEvent::Submit,
        PetEvent::Answer,
        PetEvent::ChatAnswer,
        PetEvent::Dismiss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PetEvent::Activate => "activate",
            PetEvent::Greet => "greet",
            PetEvent::Alert => "alert",
            PetEvent::Submit => "submit",
            PetEvent::Answer => "answer",
            PetEvent::ChatAnswer => "chat_answer",
            PetEvent::Dismiss => "dismiss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pet event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for PetEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PetEvent::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

/// The legal transition graph.
pub struct TransitionTable;

impl TransitionTable {
    /// Pure function: (current posture, event) -> next posture.
    /// `None` means the pair is undeclared and must be ignored.
    pub fn next(current: PetState, event: PetEvent) -> Option<PetState> {
        use PetEvent::*;
        use PetState::*;

        match (current, event) {
            (Resting, Activate) => Some(Awake),
            (Resting, Greet) => Some(Greeting),
            (Resting, PetEvent::Alert) => Some(PetState::Alert),

            (Greeting, Submit) => Some(Thinking),
            (Greeting, Dismiss) => Some(Resting),

            (PetState::Alert, Submit) => Some(Thinking),
            (PetState::Alert, Dismiss) => Some(Resting),

            (Awake, Submit) => Some(Thinking),
            (Awake, Dismiss) => Some(Resting),

            // Thinking cannot be dismissed; it always resolves into a reply posture.
            (Thinking, Answer) => Some(Reply),
            (Thinking, ChatAnswer) => Some(IdleChat),

            (Reply, Submit) => Some(Thinking),
            (Reply, Dismiss) => Some(Resting),

            (IdleChat, Submit) => Some(Thinking),
            (IdleChat, Dismiss) => Some(Resting),

            _ => None,
        }
    }

    /// Every declared transition leaving `state`.
    pub fn outgoing(state: PetState) -> Vec<(PetEvent, PetState)> {
        PetEvent::ALL
            .iter()
            .filter_map(|&e| Self::next(state, e).map(|to| (e, to)))
            .collect()
    }
}

/// Event fired when a notice targeting `target` is shown from rest.
pub fn notice_event(target: PetState) -> PetEvent {
    match target {
        PetState::Greeting => PetEvent::Greet,
        PetState::Alert => PetEvent::Alert,
        _ => PetEvent::Activate,
    }
}

/// Idle time after which `state` falls back to rest on its own.
pub fn dismiss_after(state: PetState) -> Option<Duration> {
    match state {
        PetState::Reply | PetState::IdleChat => Some(Duration::from_millis(AUTO_REST_MS)),
        PetState::Alert => Some(Duration::from_millis(ALERT_DISMISS_MS)),
        _ => None,
    }
}

/// What the renderer needs for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PetAnimation {
    pub state: PetState,
    pub opacity: f32,
    pub frame_index: u64,
    pub show_input: bool,
    pub show_bubble: bool,
}

pub type StateListener = Box<dyn Fn(PetState, PetState) + Send + Sync>;

/// The companion state machine. Owns the posture, the animation frame counter
/// and the listeners that observe posture changes.
pub struct CompanionFsm {
    state: PetState,
    entered_at: Instant,
    tick: Tick,
    listeners: Vec<StateListener>,
}

impl Default for CompanionFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompanionFsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompanionFsm")
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl CompanionFsm {
    pub fn new() -> Self {
        Self {
            state: PetState::Resting,
            entered_at: Instant::now(),
            tick: Tick::new(),
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> PetState {
        self.state
    }

    /// Register a listener receiving `(old, new)` on every applied transition.
    pub fn on_state_change<F>(&mut self, listener: F)
    where
        F: Fn(PetState, PetState) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Apply `event`. Undeclared pairs leave the posture untouched and notify nobody.
    pub fn trigger(&mut self, event: PetEvent) -> PetState {
        if let Some(next) = TransitionTable::next(self.state, event) {
            self.change_state(next);
        }
        self.state
    }

    /// String form of [`trigger`](Self::trigger). Unknown names are no-ops.
    pub fn trigger_named(&mut self, event: &str) -> PetState {
        match event.parse::<PetEvent>() {
            Ok(e) => self.trigger(e),
            Err(_) => self.state,
        }
    }

    /// Advance the animation frame. Never changes posture.
    pub fn tick(&mut self) {
        self.tick = self.tick.next();
    }

    /// Guard consulted before any proactive interruption.
    pub fn can_show_proactive(&self) -> bool {
        self.state == PetState::Resting
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// The current posture has outlived its auto-dismiss timer.
    pub fn auto_dismiss_due(&self) -> bool {
        self.auto_dismiss_due_after(self.time_in_state())
    }

    pub fn auto_dismiss_due_after(&self, elapsed: Duration) -> bool {
        dismiss_after(self.state).is_some_and(|limit| elapsed >= limit)
    }

    pub fn animation(&self) -> PetAnimation {
        use PetState::*;
        PetAnimation {
            state: self.state,
            opacity: if self.state == Resting { 0.85 } else { 1.0 },
            frame_index: self.tick.frame,
            show_input: matches!(self.state, Awake | Greeting | Alert | Reply | IdleChat),
            show_bubble: matches!(self.state, Thinking | Greeting | Alert | Reply | IdleChat),
        }
    }

    fn change_state(&mut self, next: PetState) {
        let old = self.state;
        self.state = next;
        self.entered_at = Instant::now();
        self.tick = Tick::new();
        for listener in &self.listeners {
            listener(old, next);
        }
    }
}
