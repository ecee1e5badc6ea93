use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::slots::SlotId;
use super::state::NotificationState;

/// Top-level key holding every day record.
pub const DAILY_NEWS_STATE_KEY: &str = "daily_news";

/// Number of most recent day keys kept on every save.
pub const RETAINED_DAYS: usize = 7;

/// Outcome recorded for a slot. Any recorded outcome marks the slot done for the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SlotStatus {
    Delivered,
    SkippedNoUniqueTopic,
    /// A status written by something else. Still counts as done.
    Other(String),
}

impl SlotStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SlotStatus::Delivered => "delivered",
            SlotStatus::SkippedNoUniqueTopic => "skipped_no_unique_topic",
            SlotStatus::Other(s) => s,
        }
    }
}

impl From<String> for SlotStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "delivered" => SlotStatus::Delivered,
            "skipped_no_unique_topic" => SlotStatus::SkippedNoUniqueTopic,
            _ => SlotStatus::Other(s),
        }
    }
}

impl From<SlotStatus> for String {
    fn from(s: SlotStatus) -> Self {
        s.as_str().to_string()
    }
}

/// Per-calendar-day bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    /// Slots delivered today, in delivery order, no duplicates.
    pub delivered_slots: Vec<String>,
    /// Normalized topic keys used today, append-only.
    pub used_topics: Vec<String>,
    pub slot_status: BTreeMap<String, SlotStatus>,
}

impl DayRecord {
    /// Merge whatever is stored onto the defaults. Each field is taken only if
    /// it has the right shape; anything else falls back to empty.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut record = DayRecord::default();
        let Some(Value::Object(obj)) = value else {
            return record;
        };

        if let Some(Value::Array(items)) = obj.get("delivered_slots") {
            record.delivered_slots = strings(items);
        }
        if let Some(Value::Array(items)) = obj.get("used_topics") {
            record.used_topics = strings(items);
        }
        if let Some(Value::Object(statuses)) = obj.get("slot_status") {
            record.slot_status = statuses
                .iter()
                .map(|(k, v)| {
                    let status = match v {
                        Value::String(s) => SlotStatus::from(s.clone()),
                        other => SlotStatus::Other(other.to_string()),
                    };
                    (k.clone(), status)
                })
                .collect();
        }
        record
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn is_slot_done(&self, slot: SlotId) -> bool {
        self.slot_status.contains_key(slot.as_str())
    }

    pub fn status_of(&self, slot: SlotId) -> Option<&SlotStatus> {
        self.slot_status.get(slot.as_str())
    }

    pub fn mark_skipped(&mut self, slot: SlotId) {
        self.slot_status
            .insert(slot.as_str().to_string(), SlotStatus::SkippedNoUniqueTopic);
    }

    pub fn mark_delivered(&mut self, slot: SlotId, topic_key: &str) {
        if !topic_key.is_empty() && !self.used_topics.iter().any(|t| t == topic_key) {
            self.used_topics.push(topic_key.to_string());
        }
        self.slot_status
            .insert(slot.as_str().to_string(), SlotStatus::Delivered);
        if !self.delivered_slots.iter().any(|s| s == slot.as_str()) {
            self.delivered_slots.push(slot.as_str().to_string());
        }
    }
}

fn strings(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// ISO date of the local calendar day.
pub fn day_key(now: NaiveDateTime) -> String {
    now.date().format("%Y-%m-%d").to_string()
}

/// Read today's record, never cached: defaults merged onto whatever is stored.
pub fn load_day(state: &NotificationState, now: NaiveDateTime) -> DayRecord {
    let news = state.get(DAILY_NEWS_STATE_KEY);
    let key = day_key(now);
    let day = news.as_ref().and_then(|n| n.as_object()).and_then(|n| n.get(&key));
    DayRecord::from_value(day)
}

/// Apply `f` to today's record and persist, pruning to the latest
/// [`RETAINED_DAYS`] day keys. Runs entirely under the store lock, so the
/// closure observes the latest persisted record.
pub fn modify_day<F>(state: &NotificationState, now: NaiveDateTime, f: F) -> DayRecord
where
    F: FnOnce(&mut DayRecord),
{
    let key = day_key(now);
    let mut out = DayRecord::default();
    state.update(DAILY_NEWS_STATE_KEY, |prev| {
        let mut news = match prev {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let mut day = DayRecord::from_value(news.get(&key));
        f(&mut day);
        news.insert(key.clone(), day.to_value());
        out = day;
        Value::Object(prune(news))
    });
    out
}

/// Keep the lexicographically greatest day keys, which for ISO dates are the
/// most recent ones.
fn prune(news: Map<String, Value>) -> Map<String, Value> {
    let mut keys: Vec<String> = news.keys().cloned().collect();
    keys.sort();
    let cutoff = keys.len().saturating_sub(RETAINED_DAYS);
    let keep = &keys[cutoff..];
    news.into_iter()
        .filter(|(k, _)| keep.contains(k))
        .collect()
}
