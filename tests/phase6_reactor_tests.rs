mod helpers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use buddy::config::{CompanionConfig, DailyChatConfig};
use buddy::intent::{ModeScores, ResponseMode, RouteDecision, RouteSource};
use buddy::kernel::context::AppContext;
use buddy::kernel::event::{DriverEvent, InputEvent, TaskId, TurnResult, UiCommand};
use buddy::kernel::presence::PetState;
use buddy::kernel::reactor::{answer_turn, ONBOARDING_HINT, ONBOARDING_PROMPT};
use buddy::kernel::scheduler::SideEffect;
use buddy::notifications::daily_chat::DAILY_CHAT_HINT;
use buddy::notifications::day_record::modify_day;
use buddy::notifications::{Notification, SlotId};
use buddy::services::llm::CompletionProvider;
use helpers::{
    at, harness, on, test_config, topic_json, turn_task, ui_commands, wake_task, FakeAssistant, FakeClassifier,
    Harness, Reply,
};

fn quiet_config() -> CompanionConfig {
    CompanionConfig {
        daily_chat: DailyChatConfig {
            enabled: false,
            ..DailyChatConfig::default()
        },
        ..test_config()
    }
}

fn activate(app: &str) -> InputEvent {
    InputEvent::Activate { app: AppContext::new(app) }
}

/// Run the pending turn the way the driver would and feed the result back.
async fn finish_turn(h: &mut Harness, effects: &[SideEffect]) -> Vec<SideEffect> {
    let (task, utterance, question, reset) = turn_task(effects).expect("turn spawned");
    let ctx = &h.reactor.ctx;
    let (result, route) = answer_turn(
        &ctx.assistant,
        &ctx.router,
        ctx.classifier.as_deref(),
        &utterance,
        &question,
        &ctx.app.clone(),
        reset,
    )
    .await;
    h.reactor
        .tick_step(vec![], vec![DriverEvent::TurnCompleted { task, result, route }])
}

#[tokio::test]
async fn test_onboarding_collects_and_saves_key() {
    let config = CompanionConfig {
        api_key: String::new(),
        ..quiet_config()
    };
    let mut h = harness(config, FakeAssistant::always("unused"), None, at(9, 0));
    assert!(h.reactor.ctx.onboarding);

    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Awake);
    assert_eq!(
        ui_commands(&effects),
        vec![UiCommand::ShowNotice {
            text: ONBOARDING_PROMPT.into(),
            hint: ONBOARDING_HINT.into(),
            status: "Setup: API key needed".into(),
            pet_state: PetState::Awake,
        }]
    );

    // anything that is not a key asks again
    let effects = h.reactor.tick_step(vec![InputEvent::Submit("what is this?".into())], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Reply);
    match &ui_commands(&effects)[..] {
        [UiCommand::ShowReply { text, mode, .. }] => {
            assert!(text.starts_with("I still need your Anthropic API key"));
            assert_eq!(*mode, ResponseMode::Work);
        }
        other => panic!("unexpected ui: {:?}", other),
    }
    assert!(h.reactor.ctx.onboarding);

    let effects = h
        .reactor
        .tick_step(vec![InputEvent::Submit(" sk-ant-REDACTED ".into())], vec![]);
    assert!(!h.reactor.ctx.onboarding);
    assert!(effects.contains(&SideEffect::PersistApiKey("sk-ant-REDACTED".into())));
    for effect in effects {
        h.reactor.execute(effect).await;
    }

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&h.config_path).unwrap()).unwrap();
    assert_eq!(saved["api_key"], "sk-ant-REDACTED");
    assert_eq!(saved["onboarding_done"], true);
    assert_eq!(h.reactor.ctx.config.api_key, "sk-ant-REDACTED");
    assert!(h.reactor.ctx.classifier.is_some());
    assert_eq!(h.reactor.telemetry.snapshot().onboarding_completed, 1);
}

#[tokio::test]
async fn test_onboarding_skip_keeps_asking_next_time() {
    let config = CompanionConfig {
        api_key: "  ".into(),
        ..quiet_config()
    };
    let mut h = harness(config, FakeAssistant::always("unused"), None, at(9, 0));
    h.reactor.tick_step(vec![activate("")], vec![]);
    let effects = h.reactor.tick_step(vec![InputEvent::Submit("skip".into())], vec![]);
    assert!(!effects.iter().any(|e| matches!(e, SideEffect::PersistApiKey(_))));

    h.reactor.tick_step(vec![InputEvent::Dismiss], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Resting);
    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    assert!(matches!(
        &ui_commands(&effects)[..],
        [UiCommand::ShowNotice { text, .. }] if text.as_str() == ONBOARDING_PROMPT
    ));
}

#[tokio::test]
async fn test_wake_greeting_then_casual_chat() {
    let assistant = FakeAssistant::scripted(
        vec![
            Reply::Text(topic_json("tea", "Morning! Tea or coffee today?")),
            Reply::Text("Coffee, always.".into()),
        ],
        Reply::Fail,
    );
    let classifier: Arc<dyn CompletionProvider> = Arc::new(FakeClassifier::answering("casual"));
    let mut h = harness(test_config(), assistant, Some(classifier), at(9, 0));

    // the greeting is fetched off-loop; within the wait the companion shows
    // the greeting itself instead of a plain wake
    let effects = h.reactor.tick_step(vec![activate("vscode")], vec![]);
    let task = wake_task(&effects).expect("wake greeting spawned");
    assert_eq!(effects.len(), 1);
    assert_eq!(h.reactor.posture(), PetState::Resting);

    let notification = h.reactor.ctx.manager.check_pending(at(9, 0)).await;
    let effects = h
        .reactor
        .tick_step(vec![], vec![DriverEvent::WakeGreeting { task, notification }]);
    assert_eq!(h.reactor.posture(), PetState::Greeting);
    assert_eq!(
        ui_commands(&effects),
        vec![UiCommand::ShowNotice {
            text: "Morning! Tea or coffee today?".into(),
            hint: DAILY_CHAT_HINT.into(),
            status: "Daily chat".into(),
            pet_state: PetState::Greeting,
        }]
    );
    assert!(h.reactor.ctx.chat_mode);
    assert_eq!(
        h.reactor.ctx.manager.last_delivered("daily_chat:wake_first").as_deref(),
        Some("2026-03-14")
    );

    let effects = h.reactor.tick_step(vec![InputEvent::Submit("haha thanks".into())], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Thinking);
    let (_, _, question, reset) = turn_task(&effects).unwrap();
    assert!(question.starts_with("[Active app: vscode"));
    assert!(question.ends_with("\n\nhaha thanks"));
    assert!(reset);

    let effects = finish_turn(&mut h, &effects).await;
    assert_eq!(h.reactor.posture(), PetState::IdleChat);
    assert_eq!(
        ui_commands(&effects),
        vec![UiCommand::ShowReply {
            text: "Coffee, always.".into(),
            hint: "Esc close · Enter continue chatting".into(),
            mode: ResponseMode::Casual,
        }]
    );
    assert_eq!(h.probe.app_context().as_deref(), Some("vscode"));

    let snap = h.reactor.telemetry.snapshot();
    assert_eq!(snap.route_stats.by_model, 1);
    assert_eq!(snap.route_stats.casual, 1);
    assert_eq!(snap.turn_stats.answered, 1);
    assert_eq!(snap.presence_stats.greetings, 1);
}

#[tokio::test]
async fn test_activation_without_pending_notice_wakes() {
    let mut h = harness(quiet_config(), FakeAssistant::always("ok"), None, at(9, 0));
    let effects = h
        .reactor
        .tick_step(vec![InputEvent::Activate { app: AppContext::new("Gmail").with_title("Inbox") }], vec![]);
    assert!(wake_task(&effects).is_none());
    assert_eq!(h.reactor.posture(), PetState::Awake);
    assert_eq!(
        ui_commands(&effects),
        vec![UiCommand::ShowAwake { window_title: "gmail - Inbox".into() }]
    );
}

#[tokio::test]
async fn test_timed_slot_waits_for_rest() {
    let mut h = harness(
        test_config(),
        FakeAssistant::always(topic_json("rocket", "Launch window opens tonight.")),
        None,
        at(15, 1),
    );
    modify_day(&h.reactor.ctx.state, at(15, 1), |d| d.mark_delivered(SlotId::WakeFirst, "tea"));

    let effects = h.reactor.tick_step(vec![], vec![]);
    let task = effects
        .iter()
        .find_map(|e| match e {
            SideEffect::SpawnSlot { task, slot } => Some((*task, *slot)),
            _ => None,
        })
        .expect("afternoon slot polled");
    assert_eq!(task.1, SlotId::Afternoon1500);

    // the user wakes the companion while the topic is being generated
    h.reactor.tick_step(vec![activate("")], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Awake);

    let notification = h
        .reactor
        .ctx
        .daily
        .generate_for_slot(SlotId::Afternoon1500, at(15, 1), &h.reactor.ctx.state)
        .await;
    assert!(notification.is_some());
    let effects = h.reactor.tick_step(
        vec![],
        vec![DriverEvent::SlotGenerated {
            task: task.0,
            slot: task.1,
            notification,
        }],
    );
    assert!(ui_commands(&effects).is_empty());
    assert_eq!(h.reactor.deferred().count(), 1);
    assert_eq!(h.reactor.posture(), PetState::Awake);

    let effects = h.reactor.tick_step(vec![InputEvent::Dismiss], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Greeting);
    let ui = ui_commands(&effects);
    assert_eq!(ui[0], UiCommand::Rest);
    assert!(matches!(
        &ui[1],
        UiCommand::ShowNotice { text, status, .. }
            if text.as_str() == "Launch window opens tonight." && status.as_str() == "News update (3 PM)"
    ));
    assert_eq!(h.reactor.deferred().count(), 0);

    let snap = h.reactor.telemetry.snapshot();
    assert_eq!(snap.slot_stats.delivered, 1);
    assert_eq!(snap.slot_stats.deferred, 1);
}

#[tokio::test]
async fn test_failed_turn_follows_conversation_mode() {
    // opened by a greeting: the error is shown casually
    let assistant = FakeAssistant::scripted(vec![Reply::Text(topic_json("tea", "Morning!"))], Reply::Fail);
    let mut h = harness(test_config(), assistant, None, at(9, 0));
    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    let task = wake_task(&effects).unwrap();
    let notification = h.reactor.ctx.manager.check_pending(at(9, 0)).await;
    h.reactor
        .tick_step(vec![], vec![DriverEvent::WakeGreeting { task, notification }]);

    let effects = h.reactor.tick_step(vec![InputEvent::Submit("fix the build".into())], vec![]);
    let effects = finish_turn(&mut h, &effects).await;
    assert_eq!(h.reactor.posture(), PetState::IdleChat);
    match &ui_commands(&effects)[..] {
        [UiCommand::ShowReply { text, mode, .. }] => {
            assert!(text.starts_with("Error: "));
            assert_eq!(*mode, ResponseMode::Casual);
        }
        other => panic!("unexpected ui: {:?}", other),
    }

    // opened by a manual wake: the error is a plain reply
    let mut h = harness(quiet_config(), FakeAssistant::failing(), None, at(9, 0));
    h.reactor.tick_step(vec![activate("")], vec![]);
    let effects = h.reactor.tick_step(vec![InputEvent::Submit("fix the build".into())], vec![]);
    finish_turn(&mut h, &effects).await;
    assert_eq!(h.reactor.posture(), PetState::Reply);
    assert_eq!(h.reactor.telemetry.snapshot().turn_stats.failed, 1);
}

#[tokio::test]
async fn test_stale_turn_result_is_dropped() {
    let mut h = harness(quiet_config(), FakeAssistant::always("Here you go."), None, at(9, 0));
    h.reactor.tick_step(vec![activate("")], vec![]);
    let effects = h.reactor.tick_step(vec![InputEvent::Submit("review my email".into())], vec![]);

    let stale = DriverEvent::TurnCompleted {
        task: TaskId::new(),
        result: TurnResult::Legacy("old".into()),
        route: RouteDecision {
            mode: ResponseMode::Work,
            source: RouteSource::Rule,
            scores: ModeScores { work: 2, casual: 0 },
        },
    };
    let dropped = h.reactor.tick_step(vec![], vec![stale]);
    assert!(ui_commands(&dropped).is_empty());
    assert_eq!(h.reactor.posture(), PetState::Thinking);

    // a second submit while thinking is ignored
    let again = h.reactor.tick_step(vec![InputEvent::Submit("hello?".into())], vec![]);
    assert!(turn_task(&again).is_none());

    finish_turn(&mut h, &effects).await;
    assert_eq!(h.reactor.posture(), PetState::Reply);
    let snap = h.reactor.telemetry.snapshot();
    assert_eq!(snap.turn_stats.dropped, 1);
    assert_eq!(snap.turn_stats.answered, 1);
}

async fn next_ui(ui: &mut mpsc::Receiver<UiCommand>) -> UiCommand {
    tokio::time::timeout(Duration::from_secs(2), ui.recv())
        .await
        .expect("ui command in time")
        .expect("ui channel open")
}

#[tokio::test]
async fn test_run_loop_end_to_end() {
    let h = harness(quiet_config(), FakeAssistant::always("Try restarting the server."), None, at(9, 0));
    let Harness {
        mut reactor,
        inputs,
        mut ui,
        ..
    } = h;

    let driver = async move {
        let mut seen = Vec::new();
        inputs.send(activate("terminal")).await.unwrap();
        seen.push(next_ui(&mut ui).await);
        inputs.send(InputEvent::Submit("the deploy failed".into())).await.unwrap();
        seen.push(next_ui(&mut ui).await);
        seen.push(next_ui(&mut ui).await);
        inputs.send(InputEvent::Quit).await.unwrap();
        seen
    };

    let (_, seen) = tokio::join!(reactor.run(), driver);
    assert_eq!(seen[0], UiCommand::ShowAwake { window_title: "terminal".into() });
    assert_eq!(seen[1], UiCommand::ShowThinking);
    assert_eq!(
        seen[2],
        UiCommand::ShowReply {
            text: "Try restarting the server.".into(),
            hint: "Esc close · Enter follow-up".into(),
            mode: ResponseMode::Work,
        }
    );
    assert_eq!(reactor.posture(), PetState::Reply);
    assert!(reactor.shutdown_token().is_cancelled());
}

#[tokio::test]
async fn test_repeated_activation_wakes_without_greeting() {
    let assistant = FakeAssistant::always(topic_json("tea", "Morning! Tea or coffee today?"));
    let mut h = harness(test_config(), assistant, None, at(9, 0));

    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    let task = wake_task(&effects).unwrap();

    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    assert!(wake_task(&effects).is_none(), "one greeting at a time");
    assert_eq!(h.reactor.posture(), PetState::Awake);
    assert_eq!(
        ui_commands(&effects),
        vec![UiCommand::ShowAwake { window_title: "Unknown".into() }]
    );

    // the greeting lands while the user is busy and waits for rest
    let notification = h.reactor.ctx.manager.check_pending(at(9, 0)).await;
    let effects = h
        .reactor
        .tick_step(vec![], vec![DriverEvent::WakeGreeting { task, notification }]);
    assert!(ui_commands(&effects).is_empty());
    assert_eq!(h.reactor.deferred().count(), 1);

    let effects = h.reactor.tick_step(vec![InputEvent::Dismiss], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Greeting);
    assert!(matches!(
        &ui_commands(&effects)[..],
        [UiCommand::Rest, UiCommand::ShowNotice { text, .. }] if text.as_str() == "Morning! Tea or coffee today?"
    ));
}

#[tokio::test]
async fn test_empty_late_greeting_does_not_rewake() {
    let mut h = harness(test_config(), FakeAssistant::failing(), None, at(9, 0));
    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    let task = wake_task(&effects).unwrap();
    h.reactor.tick_step(vec![activate("")], vec![]);
    h.reactor.tick_step(vec![InputEvent::Dismiss], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Resting);

    let effects = h
        .reactor
        .tick_step(vec![], vec![DriverEvent::WakeGreeting { task, notification: None }]);
    assert!(ui_commands(&effects).is_empty());
    assert_eq!(h.reactor.posture(), PetState::Resting);
}

#[tokio::test]
async fn test_typing_during_greeting_is_answered() {
    let mut h = harness(
        test_config(),
        FakeAssistant::scripted(
            vec![
                Reply::Text(topic_json("tea", "Morning!")),
                Reply::Text("Check the failing test first.".into()),
            ],
            Reply::Fail,
        ),
        None,
        at(9, 0),
    );
    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    let wake = wake_task(&effects).unwrap();

    let effects = h.reactor.tick_step(vec![InputEvent::Submit("fix the build".into())], vec![]);
    assert_eq!(h.reactor.posture(), PetState::Thinking);
    assert_eq!(
        ui_commands(&effects),
        vec![
            UiCommand::ShowAwake { window_title: "Unknown".into() },
            UiCommand::ShowThinking,
        ]
    );
    assert!(turn_task(&effects).is_some());

    let notification = h.reactor.ctx.manager.check_pending(at(9, 0)).await;
    h.reactor
        .tick_step(vec![], vec![DriverEvent::WakeGreeting { task: wake, notification }]);
    assert_eq!(h.reactor.posture(), PetState::Thinking);
    assert_eq!(h.reactor.deferred().count(), 1);

    let effects = finish_turn(&mut h, &effects).await;
    assert_eq!(h.reactor.posture(), PetState::Reply);
    assert!(matches!(
        &ui_commands(&effects)[..],
        [UiCommand::ShowReply { text, .. }] if text.as_str() == "Check the failing test first."
    ));
}

#[tokio::test]
async fn test_slow_greeting_falls_back_to_plain_wake() {
    let config = CompanionConfig {
        greeting_wait_ms: 50,
        ..test_config()
    };
    let assistant = FakeAssistant::always(topic_json("tea", "Morning!")).with_delay(Duration::from_millis(400));
    let mut h = harness(config, assistant, None, at(9, 0));

    let effects = h.reactor.tick_step(vec![activate("")], vec![]);
    let task = wake_task(&effects).unwrap();
    for effect in effects {
        h.reactor.execute(effect).await;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let results = h.reactor.drain_results();
    assert!(matches!(&results[..], [DriverEvent::WakeGreetingDelayed { task: t }] if *t == task));
    let effects = h.reactor.tick_step(vec![], results);
    assert_eq!(h.reactor.posture(), PetState::Awake);
    assert_eq!(
        ui_commands(&effects),
        vec![UiCommand::ShowAwake { window_title: "Unknown".into() }]
    );

    tokio::time::sleep(Duration::from_millis(600)).await;
    let results = h.reactor.drain_results();
    assert!(matches!(&results[..], [DriverEvent::WakeGreeting { notification: Some(_), .. }]));
    let effects = h.reactor.tick_step(vec![], results);
    assert!(ui_commands(&effects).is_empty());
    assert_eq!(h.reactor.posture(), PetState::Awake);
    assert_eq!(h.reactor.deferred().count(), 1);
}

#[tokio::test]
async fn test_deferred_notice_expires_at_midnight() {
    let mut h = harness(quiet_config(), FakeAssistant::always("unused"), None, at(23, 58));
    h.reactor.tick_step(vec![activate("")], vec![]);

    let late = Notification::new(
        "daily_chat:evening_2000",
        "Clear skies tonight, look up.",
        DAILY_CHAT_HINT,
        "News update (8 PM)",
        PetState::Greeting,
    );
    h.reactor.tick_step(
        vec![],
        vec![DriverEvent::SlotGenerated {
            task: TaskId::new(),
            slot: SlotId::Evening2000,
            notification: Some(late),
        }],
    );
    assert_eq!(h.reactor.deferred().count(), 1);

    h.clock.set(on(15, 9, 0));
    let effects = h.reactor.tick_step(vec![InputEvent::Dismiss], vec![]);
    assert_eq!(ui_commands(&effects), vec![UiCommand::Rest]);
    assert_eq!(h.reactor.posture(), PetState::Resting);
    assert_eq!(h.reactor.deferred().count(), 0);
}
