use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::base::{Notification, NotificationSource};
use super::day_record::{day_key, load_day, modify_day};
use super::payload::{normalize_topic, parse_topic_payload, Rejection, TopicPayload};
use super::slots::{is_due, SlotId, TIMED_SLOTS};
use super::state::NotificationState;
use crate::config::DailyChatConfig;
use crate::kernel::presence::PetState;
use crate::services::llm::prompts::DAILY_CHAT_SYSTEM_PROMPT;
use crate::services::llm::{PromptOverride, SharedAssistant};

pub const DAILY_CHAT_HINT: &str = "Enter reply - Esc dismiss";

/// Token budget for one opener attempt.
pub const DAILY_CHAT_MAX_TOKENS: u32 = 320;

pub fn source_id_for(slot: SlotId) -> String {
    format!("daily_chat:{}", slot.as_str())
}

/// User prompt for one generation attempt.
pub fn build_slot_prompt(slot: SlotId, now: NaiveDateTime, used: &BTreeSet<String>) -> String {
    let used_list = if used.is_empty() {
        "(none)".to_string()
    } else {
        used.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    format!(
        "Today is {}. Current slot is {}. Already used topic keys today: {}. Return JSON only.",
        day_key(now),
        slot.label(),
        used_list
    )
}

/// Daily proactive news opener: one wake-up slot and two wall-clock slots, each
/// at most once per day, never repeating a topic within the day.
pub struct DailyChatSource {
    config: DailyChatConfig,
    assistant: SharedAssistant,
}

impl DailyChatSource {
    pub fn new(config: DailyChatConfig, assistant: SharedAssistant) -> Self {
        Self { config, assistant }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn should_trigger_slot(&self, state: &NotificationState, slot: SlotId, now: NaiveDateTime) -> bool {
        if !self.is_enabled() {
            return false;
        }
        !load_day(state, now).is_slot_done(slot)
    }

    /// Timed slots whose target time has passed and which are not done yet, in
    /// declaration order.
    pub fn pending_timed_slots(&self, state: &NotificationState, now: NaiveDateTime) -> Vec<SlotId> {
        let schedule = self.config.timed_schedule();
        TIMED_SLOTS
            .iter()
            .zip(schedule.iter())
            .filter(|(slot, hhmm)| self.should_trigger_slot(state, **slot, now) && is_due(now, hhmm))
            .map(|(slot, _)| *slot)
            .collect()
    }

    /// Generate, validate and record the opener for `slot`.
    ///
    /// Returns `None` when the slot is not due, already resolved today, or
    /// every attempt was rejected (the slot is then recorded as skipped).
    pub async fn generate_for_slot(
        &self,
        slot: SlotId,
        now: NaiveDateTime,
        state: &NotificationState,
    ) -> Option<Notification> {
        if !self.should_trigger_slot(state, slot, now) {
            return None;
        }

        // Held for the whole generation: the prompt override below must never
        // be observed by another caller.
        let mut assistant = self.assistant.lock().await;

        // Another generation may have resolved this slot while we waited.
        if !self.should_trigger_slot(state, slot, now) {
            debug!("Slot {} resolved while waiting for the assistant", slot);
            return None;
        }

        let used: BTreeSet<String> = load_day(state, now)
            .used_topics
            .iter()
            .map(|t| normalize_topic(t))
            .filter(|t| !t.is_empty())
            .collect();
        let prompt = build_slot_prompt(slot, now, &used);
        let attempts = self.config.retry_limit();

        let accepted = {
            let mut session =
                PromptOverride::apply(&mut **assistant, DAILY_CHAT_SYSTEM_PROMPT, DAILY_CHAT_MAX_TOKENS);
            let mut accepted: Option<TopicPayload> = None;
            for attempt in 1..=attempts {
                session.clear_history();
                let raw = match session.ask(&prompt, None).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("Daily chat {} attempt {}/{} failed: {}", slot, attempt, attempts, e);
                        session.clear_history();
                        continue;
                    }
                };
                match parse_topic_payload(&raw, &used) {
                    Ok(payload) => {
                        accepted = Some(payload);
                        break;
                    }
                    Err(Rejection::DuplicateTopic(key)) => {
                        info!("Daily chat {} attempt {}/{}: topic '{}' already used today", slot, attempt, attempts, key);
                    }
                    Err(reason) => {
                        info!("Daily chat {} attempt {}/{} rejected: {:?}", slot, attempt, attempts, reason);
                    }
                }
            }
            accepted
        };

        let Some(payload) = accepted else {
            modify_day(state, now, |day| {
                if !day.is_slot_done(slot) {
                    day.mark_skipped(slot);
                }
            });
            warn!("Daily chat {} skipped: no unique topic after {} attempts", slot, attempts);
            return None;
        };

        let mut won = false;
        modify_day(state, now, |day| {
            if !day.is_slot_done(slot) {
                day.mark_delivered(slot, &payload.topic_key);
                won = true;
            }
        });
        if !won {
            return None;
        }

        info!("Daily chat {} delivered topic '{}'", slot, payload.topic_key);
        Some(Notification::new(
            source_id_for(slot),
            payload.message,
            DAILY_CHAT_HINT,
            slot.status_text(),
            PetState::Greeting,
        ))
    }
}

/// Registered with the manager: covers the wake-up slot only. Timed slots are
/// polled by the scheduler through [`DailyChatSource::pending_timed_slots`].
#[async_trait]
impl NotificationSource for DailyChatSource {
    fn source_id(&self) -> &str {
        "daily_chat"
    }

    fn check(&self, state: &NotificationState, now: NaiveDateTime) -> bool {
        self.should_trigger_slot(state, SlotId::WakeFirst, now)
    }

    async fn generate(&self, state: &NotificationState, now: NaiveDateTime) -> Option<Notification> {
        self.generate_for_slot(SlotId::WakeFirst, now, state).await
    }
}
