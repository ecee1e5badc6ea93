use std::collections::VecDeque;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::{build_claude, AppContext, CompanionContext};
use super::event::{reply_hint, resolve_reply, DriverEvent, InputEvent, TaskId, TurnResult, UiCommand};
use super::presence::{notice_event, PetEvent, PetState};
use super::scheduler::{Delivery, Scheduler, SideEffect};
use super::telemetry::event::{LifecycleEvent, SlotOutcomeKind, TelemetryEvent, TurnEventKind};
use super::telemetry::TelemetryRecorder;
use super::time::{Clock, Tick, FRAME_MS};
use crate::config::save_api_key;
use crate::intent::{IntentRouter, ResponseMode, RouteDecision};
use crate::notifications::day_record::day_key;
use crate::notifications::{load_day, Notification, SlotId, SlotStatus};
use crate::services::llm::{CompletionProvider, SharedAssistant};

pub const ONBOARDING_PROMPT: &str = "Hi! Before we start, please paste your Anthropic API key here.\n\n\
    You can also configure it manually in:\n\
    - config.json -> api_key\n\
    - the ANTHROPIC_API_KEY environment variable";
pub const ONBOARDING_HINT: &str = "Paste key + Enter · type 'skip' for manual setup";
pub const ONBOARDING_STATUS: &str = "Setup: API key needed";

const ONBOARDING_SKIPPED: &str = "No problem. To finish setup later, add your key to either \
    `config.json` (`api_key`) or the `ANTHROPIC_API_KEY` environment variable, then wake me again.";
const ONBOARDING_SAVED: &str = "Nice. API key saved. Wake me again and ask anything.";
const ONBOARDING_RETRY: &str = "I still need your Anthropic API key. Paste it here and press Enter.\n\
    Tip: it usually starts with `sk-`.\n\
    If you want to set it manually, type `skip`.";

pub fn looks_like_api_key(text: &str) -> bool {
    let value = text.trim();
    value.len() > 20 && value.starts_with("sk-")
}

/// The companion orchestrator.
///
/// `tick_step` is the pure half: it folds inputs and task results into the
/// context and returns side effects, never awaiting. `run` is the driver that
/// paces steps and executes those effects.
pub struct Reactor {
    pub ctx: CompanionContext,
    pub receiver: mpsc::Receiver<InputEvent>,
    driver_tx: mpsc::Sender<DriverEvent>,
    driver_rx: mpsc::Receiver<DriverEvent>,
    ui_tx: mpsc::Sender<UiCommand>,
    clock: Arc<dyn Clock>,
    pub scheduler: Scheduler,
    pub telemetry: TelemetryRecorder,
    pub tick: Tick,
    shutdown: CancellationToken,
    turn: Option<TaskId>,
    wake: Option<TaskId>,
    /// The user was woken while the wake greeting was still generating.
    woke_without_greeting: bool,
    slot_task: Option<(TaskId, SlotId)>,
    /// Notices waiting for rest, keyed by the day they were generated for.
    deferred: VecDeque<(String, Notification)>,
    /// The next turn starts from a clean, app-specialized history.
    reset_pending: bool,
}

impl Reactor {
    pub fn new(
        ctx: CompanionContext,
        receiver: mpsc::Receiver<InputEvent>,
        ui_tx: mpsc::Sender<UiCommand>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (driver_tx, driver_rx) = mpsc::channel(32);
        let scheduler = Scheduler::new(ctx.config.poll_interval_secs);
        Self {
            ctx,
            receiver,
            driver_tx,
            driver_rx,
            ui_tx,
            clock,
            scheduler,
            telemetry: TelemetryRecorder::new(),
            tick: Tick::new(),
            shutdown: CancellationToken::new(),
            turn: None,
            wake: None,
            woke_without_greeting: false,
            slot_task: None,
            deferred: VecDeque::new(),
            reset_pending: true,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn posture(&self) -> PetState {
        self.ctx.fsm.state()
    }

    pub fn deferred(&self) -> impl Iterator<Item = &Notification> {
        self.deferred.iter().map(|(_, n)| n)
    }

    /// Results of spawned tasks that have arrived since the last call.
    pub fn drain_results(&mut self) -> Vec<DriverEvent> {
        let mut results = Vec::new();
        while let Ok(event) = self.driver_rx.try_recv() {
            results.push(event);
        }
        results
    }

    fn busy(&self) -> bool {
        self.ctx.onboarding
            || self.turn.is_some()
            || self.wake.is_some()
            || self.slot_task.is_some()
            || !self.deferred.is_empty()
    }

    /// One pure step. Task results are applied before new inputs since they
    /// were produced against earlier steps.
    pub fn tick_step(&mut self, inputs: Vec<InputEvent>, results: Vec<DriverEvent>) -> Vec<SideEffect> {
        self.tick = self.tick.next();
        self.ctx.fsm.tick();
        let now = self.clock.now();
        let mut effects = Vec::new();

        for result in results {
            self.handle_result(result, now, &mut effects);
        }
        for input in inputs {
            self.handle_input(input, now, &mut effects);
        }

        if self.turn.is_none() && self.ctx.fsm.auto_dismiss_due() {
            debug!("{} timed out, returning to rest", self.ctx.fsm.state());
            self.rest(&mut effects);
        }

        self.drain_deferred(now, &mut effects);

        if self.scheduler.poll_due(now) {
            self.poll_slots(now, &mut effects);
        }

        effects
    }

    fn fire(&mut self, event: PetEvent) -> bool {
        let from = self.ctx.fsm.state();
        let to = self.ctx.fsm.trigger(event);
        if from == to {
            return false;
        }
        self.telemetry.record(TelemetryEvent::PresenceTransition {
            from,
            to,
            tick: self.tick,
        });
        true
    }

    fn handle_input(&mut self, input: InputEvent, now: NaiveDateTime, effects: &mut Vec<SideEffect>) {
        match input {
            InputEvent::Activate { app } => self.activate(app, now, effects),
            InputEvent::Submit(text) => self.submit(&text, effects),
            InputEvent::Dismiss => self.rest(effects),
            InputEvent::Quit => {
                self.telemetry
                    .record(TelemetryEvent::Lifecycle(LifecycleEvent::Shutdown));
                effects.push(SideEffect::Shutdown);
            }
        }
    }

    fn rest(&mut self, effects: &mut Vec<SideEffect>) {
        if self.fire(PetEvent::Dismiss) {
            self.ctx.chat_mode = false;
            effects.push(SideEffect::Ui(UiCommand::Rest));
        }
    }

    /// Plain wake while the greeting is still being written. The greeting
    /// arrives later and waits for rest like any other late notice.
    fn wake_without_greeting(&mut self, effects: &mut Vec<SideEffect>) {
        self.woke_without_greeting = true;
        if self.fire(PetEvent::Activate) {
            effects.push(SideEffect::Ui(UiCommand::ShowAwake {
                window_title: self.ctx.app.display_title(),
            }));
        }
    }

    fn activate(&mut self, app: AppContext, now: NaiveDateTime, effects: &mut Vec<SideEffect>) {
        if self.ctx.onboarding {
            self.fire(PetEvent::Activate);
            effects.push(SideEffect::Ui(UiCommand::ShowNotice {
                text: ONBOARDING_PROMPT.into(),
                hint: ONBOARDING_HINT.into(),
                status: ONBOARDING_STATUS.into(),
                pet_state: PetState::Awake,
            }));
            return;
        }

        info!("Activated: {}", app.display_title());
        let window_title = app.display_title();
        self.ctx.app = app;
        self.ctx.chat_mode = false;
        self.reset_pending = true;

        if self.ctx.fsm.state() != PetState::Resting {
            effects.push(SideEffect::Ui(UiCommand::ShowAwake { window_title }));
            return;
        }
        if self.wake.is_some() {
            debug!("Wake greeting still in flight, waking without it");
            self.wake_without_greeting(effects);
            return;
        }
        if self.ctx.manager.any_ready(now) {
            let task = TaskId::new();
            self.wake = Some(task);
            effects.push(SideEffect::SpawnWakeGreeting { task });
            return;
        }
        if self.fire(PetEvent::Activate) {
            effects.push(SideEffect::Ui(UiCommand::ShowAwake { window_title }));
        }
    }

    fn submit(&mut self, text: &str, effects: &mut Vec<SideEffect>) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.ctx.onboarding {
            self.onboarding_reply(text, effects);
            return;
        }
        if self.turn.is_some() {
            warn!("A turn is already in flight; submission ignored");
            return;
        }
        if self.wake.is_some() && self.ctx.fsm.state() == PetState::Resting {
            self.wake_without_greeting(effects);
        }
        if !self.fire(PetEvent::Submit) {
            debug!("Submit ignored in {}", self.ctx.fsm.state());
            return;
        }

        let task = TaskId::new();
        self.turn = Some(task);
        self.telemetry
            .record(TelemetryEvent::TurnLifecycle(TurnEventKind::Requested));
        effects.push(SideEffect::Ui(UiCommand::ShowThinking));
        effects.push(SideEffect::SpawnTurn {
            task,
            utterance: text.to_string(),
            question: self.ctx.app.frame_question(text),
            app: self.ctx.app.clone(),
            reset: std::mem::take(&mut self.reset_pending),
        });
    }

    fn onboarding_reply(&mut self, text: &str, effects: &mut Vec<SideEffect>) {
        let reply = if matches!(text.to_lowercase().as_str(), "skip" | "later" | "not now") {
            self.telemetry
                .record(TelemetryEvent::Lifecycle(LifecycleEvent::OnboardingSkipped));
            ONBOARDING_SKIPPED
        } else if looks_like_api_key(text) {
            self.ctx.onboarding = false;
            self.telemetry
                .record(TelemetryEvent::Lifecycle(LifecycleEvent::OnboardingCompleted));
            effects.push(SideEffect::PersistApiKey(text.to_string()));
            ONBOARDING_SAVED
        } else {
            ONBOARDING_RETRY
        };

        self.fire(PetEvent::Submit);
        self.fire(PetEvent::Answer);
        effects.push(SideEffect::Ui(UiCommand::ShowReply {
            text: reply.into(),
            hint: reply_hint(ResponseMode::Work).into(),
            mode: ResponseMode::Work,
        }));
    }

    fn handle_result(&mut self, result: DriverEvent, now: NaiveDateTime, effects: &mut Vec<SideEffect>) {
        match result {
            DriverEvent::WakeGreeting { task, notification } => {
                let woke_early = std::mem::take(&mut self.woke_without_greeting);
                if self.wake == Some(task) {
                    self.wake = None;
                }
                match notification {
                    Some(n) => {
                        self.record_slot(SlotId::WakeFirst, SlotOutcomeKind::Delivered);
                        self.deliver(n, now, effects);
                    }
                    None => {
                        self.record_slot(SlotId::WakeFirst, self.outcome_without_notice(SlotId::WakeFirst, now));
                        if !woke_early && self.fire(PetEvent::Activate) {
                            effects.push(SideEffect::Ui(UiCommand::ShowAwake {
                                window_title: self.ctx.app.display_title(),
                            }));
                        }
                    }
                }
            }
            DriverEvent::WakeGreetingDelayed { task } => {
                if self.wake == Some(task) && !self.woke_without_greeting {
                    info!("Wake greeting is slow, waking without it");
                    self.wake_without_greeting(effects);
                }
            }
            DriverEvent::SlotGenerated { task, slot, notification } => {
                if self.slot_task.map(|(t, _)| t) == Some(task) {
                    self.slot_task = None;
                }
                match notification {
                    Some(n) => {
                        self.record_slot(slot, SlotOutcomeKind::Delivered);
                        self.deliver(n, now, effects);
                    }
                    None => {
                        let outcome = self.outcome_without_notice(slot, now);
                        self.record_slot(slot, outcome);
                    }
                }
            }
            DriverEvent::TurnCompleted { task, result, route } => {
                if self.turn != Some(task) {
                    self.telemetry
                        .record(TelemetryEvent::TurnLifecycle(TurnEventKind::Dropped));
                    return;
                }
                self.turn = None;
                self.record_route(&route);

                let (event, mode) = resolve_reply(&result, self.ctx.chat_mode);
                self.fire(event);
                let kind = match result {
                    TurnResult::Structured { .. } => TurnEventKind::Answered,
                    TurnResult::Legacy(_) => TurnEventKind::Failed,
                };
                self.telemetry.record(TelemetryEvent::TurnLifecycle(kind));
                effects.push(SideEffect::Ui(UiCommand::ShowReply {
                    text: result.text().to_string(),
                    hint: reply_hint(mode).into(),
                    mode,
                }));
            }
        }
    }

    fn deliver(&mut self, notification: Notification, now: NaiveDateTime, effects: &mut Vec<SideEffect>) {
        let can_show = self.turn.is_none();
        match self.scheduler.delivery(self.ctx.fsm.state(), &notification) {
            Delivery::Show(_) if can_show => self.show_notice(notification, now, effects),
            _ => {
                info!("Deferring {} until the companion rests", notification.source_id);
                if let Some(slot) = slot_of(&notification) {
                    self.record_slot(slot, SlotOutcomeKind::Deferred);
                }
                self.deferred.push_back((day_key(now), notification));
            }
        }
    }

    fn show_notice(&mut self, notification: Notification, now: NaiveDateTime, effects: &mut Vec<SideEffect>) {
        if !self.fire(notice_event(notification.pet_state)) {
            self.deferred.push_front((day_key(now), notification));
            return;
        }
        self.ctx.chat_mode = notification.pet_state == PetState::Greeting;
        self.reset_pending = true;
        self.ctx.manager.mark_delivered(&notification.source_id, now);
        effects.push(SideEffect::Ui(UiCommand::ShowNotice {
            text: notification.text,
            hint: notification.hint,
            status: notification.status,
            pet_state: notification.pet_state,
        }));
    }

    fn drain_deferred(&mut self, now: NaiveDateTime, effects: &mut Vec<SideEffect>) {
        let today = day_key(now);
        self.deferred.retain(|(day, n)| {
            if *day != today {
                info!("Dropping {} left over from {}", n.source_id, day);
            }
            *day == today
        });
        if self.turn.is_some() || self.wake.is_some() || !self.ctx.fsm.can_show_proactive() {
            return;
        }
        if let Some((_, notification)) = self.deferred.pop_front() {
            self.show_notice(notification, now, effects);
        }
    }

    fn poll_slots(&mut self, now: NaiveDateTime, effects: &mut Vec<SideEffect>) {
        if self.busy() || !self.ctx.daily.is_enabled() {
            return;
        }
        let pending = self.ctx.daily.pending_timed_slots(&self.ctx.state, now);
        if let Some(slot) = self.scheduler.pick_slot(self.ctx.fsm.state(), false, &pending) {
            info!("Slot {} is due", slot);
            let task = TaskId::new();
            self.slot_task = Some((task, slot));
            effects.push(SideEffect::SpawnSlot { task, slot });
        }
    }

    fn outcome_without_notice(&self, slot: SlotId, now: NaiveDateTime) -> SlotOutcomeKind {
        match load_day(&self.ctx.state, now).status_of(slot) {
            Some(SlotStatus::SkippedNoUniqueTopic) => SlotOutcomeKind::Skipped,
            _ => SlotOutcomeKind::Idle,
        }
    }

    fn record_slot(&mut self, slot: SlotId, outcome: SlotOutcomeKind) {
        self.telemetry
            .record(TelemetryEvent::SlotOutcome { slot, outcome });
    }

    fn record_route(&mut self, route: &RouteDecision) {
        self.telemetry.record(TelemetryEvent::ModeRoute {
            source: route.source,
            mode: route.mode,
            work_score: route.scores.work,
            casual_score: route.scores.casual,
        });
    }

    /// Execute one side effect. Model work is spawned; results come back
    /// through the driver channel.
    pub async fn execute(&mut self, effect: SideEffect) {
        match effect {
            SideEffect::Ui(cmd) => {
                if self.ui_tx.send(cmd).await.is_err() {
                    debug!("UI channel closed");
                }
            }
            SideEffect::SpawnWakeGreeting { task } => {
                let manager = Arc::clone(&self.ctx.manager);
                let tx = self.driver_tx.clone();
                let now = self.clock.now();
                let wait = Duration::from_millis(self.ctx.config.greeting_wait_ms);
                tokio::spawn(async move {
                    let mut pending = Box::pin(manager.check_pending(now));
                    let notification = match timeout(wait, &mut pending).await {
                        Ok(notification) => notification,
                        Err(_) => {
                            let _ = tx.send(DriverEvent::WakeGreetingDelayed { task }).await;
                            pending.await
                        }
                    };
                    let _ = tx.send(DriverEvent::WakeGreeting { task, notification }).await;
                });
            }
            SideEffect::SpawnSlot { task, slot } => {
                let daily = Arc::clone(&self.ctx.daily);
                let state = Arc::clone(&self.ctx.state);
                let tx = self.driver_tx.clone();
                let now = self.clock.now();
                tokio::spawn(async move {
                    let notification = daily.generate_for_slot(slot, now, &state).await;
                    let _ = tx
                        .send(DriverEvent::SlotGenerated { task, slot, notification })
                        .await;
                });
            }
            SideEffect::SpawnTurn {
                task,
                utterance,
                question,
                app,
                reset,
            } => {
                let assistant = self.ctx.assistant.clone();
                let router = Arc::clone(&self.ctx.router);
                let classifier = self.ctx.classifier.clone();
                let tx = self.driver_tx.clone();
                tokio::spawn(async move {
                    let (result, route) = answer_turn(
                        &assistant,
                        &router,
                        classifier.as_deref(),
                        &utterance,
                        &question,
                        &app,
                        reset,
                    )
                    .await;
                    let _ = tx.send(DriverEvent::TurnCompleted { task, result, route }).await;
                });
            }
            SideEffect::PersistApiKey(key) => self.apply_api_key(key),
            SideEffect::Shutdown => self.shutdown.cancel(),
        }
    }

    fn apply_api_key(&mut self, key: String) {
        if let Err(e) = save_api_key(&self.ctx.config_path, &key) {
            error!("Failed to save API key: {:#}", e);
        }
        self.ctx.config.api_key = key;
        let (assistant, client) = build_claude(&self.ctx.config);
        self.ctx.classifier = Some(Arc::new(client));
        let shared = self.ctx.assistant.clone();
        tokio::spawn(async move {
            *shared.lock().await = Box::new(assistant);
        });
        info!("API key saved, assistant rebuilt");
    }

    /// Async driver loop. Runs until a `Quit` input or the shutdown token fires.
    pub async fn run(&mut self) {
        info!("Reactor started. Frame: {}ms", FRAME_MS);

        let mut cadence = interval(Duration::from_millis(FRAME_MS));
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = cadence.tick() => {}
            }

            let mut inputs = Vec::new();
            while let Ok(event) = self.receiver.try_recv() {
                inputs.push(event);
            }
            let results = self.drain_results();

            let effects = self.tick_step(inputs, results);
            for effect in effects {
                self.execute(effect).await;
            }
        }

        let snap = self.telemetry.snapshot();
        info!(
            "Reactor stopped. transitions={} slots_delivered={} slots_skipped={} turns={}",
            snap.presence_stats.transitions,
            snap.slot_stats.delivered,
            snap.slot_stats.skipped,
            snap.turn_stats.requested
        );
    }
}

fn slot_of(notification: &Notification) -> Option<SlotId> {
    SlotId::parse(notification.source_id.strip_prefix("daily_chat:")?)
}

/// Route the utterance, then ask the assistant. An assistant failure becomes
/// a legacy `Error: ...` result.
pub async fn answer_turn(
    assistant: &SharedAssistant,
    router: &IntentRouter,
    classifier: Option<&dyn CompletionProvider>,
    utterance: &str,
    question: &str,
    app: &AppContext,
    reset: bool,
) -> (TurnResult, RouteDecision) {
    let route = router.route(utterance, &app.app_type, classifier).await;

    let mut assistant = assistant.lock().await;
    if reset {
        assistant.clear_history();
        assistant.set_app_context(&app.app_type);
    }
    let result = match assistant.ask(question, None).await {
        Ok(text) => TurnResult::Structured {
            text,
            mode: route.mode,
        },
        Err(e) => {
            warn!("Assistant turn failed: {}", e);
            TurnResult::Legacy(format!("Error: {}", e))
        }
    };
    (result, route)
}
