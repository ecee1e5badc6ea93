use chrono::NaiveDateTime;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use super::base::{Notification, NotificationSource};
use super::day_record::day_key;
use super::state::NotificationState;

/// Polls registered sources in registration order and hands out the first
/// ready notification.
pub struct NotificationManager {
    state: Arc<NotificationState>,
    sources: Vec<Arc<dyn NotificationSource>>,
}

impl NotificationManager {
    pub fn new(state: Arc<NotificationState>) -> Self {
        Self {
            state,
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: Arc<dyn NotificationSource>) {
        debug!("Registered notification source {}", source.source_id());
        self.sources.push(source);
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.source_id())
    }

    pub fn state(&self) -> &Arc<NotificationState> {
        &self.state
    }

    /// Whether any source passes its cheap gate right now.
    pub fn any_ready(&self, now: NaiveDateTime) -> bool {
        self.sources.iter().any(|s| s.check(&self.state, now))
    }

    /// First notification any source produces. Remaining sources are not
    /// consulted once one succeeds. A source that panics is logged and skipped.
    pub async fn check_pending(&self, now: NaiveDateTime) -> Option<Notification> {
        for source in &self.sources {
            if !source.check(&self.state, now) {
                continue;
            }
            let polled = {
                let source = Arc::clone(source);
                let state = Arc::clone(&self.state);
                tokio::spawn(async move { source.generate(&state, now).await }).await
            };
            match polled {
                Ok(Some(notification)) => return Some(notification),
                Ok(None) => {}
                Err(e) => error!("Notification source {} failed: {}", source.source_id(), e),
            }
        }
        None
    }

    /// Stamp today's date as the last delivery of `source_id`.
    pub fn mark_delivered(&self, source_id: &str, now: NaiveDateTime) {
        self.state
            .set(&format!("{}_last_date", source_id), Value::String(day_key(now)));
    }

    pub fn last_delivered(&self, source_id: &str) -> Option<String> {
        self.state
            .get(&format!("{}_last_date", source_id))
            .and_then(|v| v.as_str().map(str::to_string))
    }
}
