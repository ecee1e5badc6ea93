use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::state::NotificationState;
use crate::kernel::presence::PetState;

pub const DEFAULT_PRIORITY: &str = "normal";

/// A proactive message ready to show, plus the posture to enter for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub source_id: String,
    pub text: String,
    pub hint: String,
    pub status: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub pet_state: PetState,
}

fn default_priority() -> String {
    DEFAULT_PRIORITY.to_string()
}

impl Notification {
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        hint: impl Into<String>,
        status: impl Into<String>,
        pet_state: PetState,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            hint: hint.into(),
            status: status.into(),
            priority: default_priority(),
            pet_state,
        }
    }
}

/// Something that can produce proactive notifications.
///
/// `check` is the cheap gate; `generate` may call out to the model and returns
/// `None` when nothing should be shown after all.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    fn source_id(&self) -> &str;

    fn check(&self, state: &NotificationState, now: NaiveDateTime) -> bool;

    async fn generate(&self, state: &NotificationState, now: NaiveDateTime) -> Option<Notification>;
}
