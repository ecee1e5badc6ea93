use chrono::{Duration, NaiveDateTime};

use super::context::AppContext;
use super::event::{TaskId, UiCommand};
use super::presence::{notice_event, PetEvent, PetState};
use crate::notifications::{Notification, SlotId};

/// Work the reactor asks its driver to perform. Produced synchronously by
/// `tick_step`, executed outside it.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Ui(UiCommand),
    /// Ask the manager for a wake-first greeting.
    SpawnWakeGreeting { task: TaskId },
    SpawnSlot { task: TaskId, slot: SlotId },
    SpawnTurn {
        task: TaskId,
        /// Raw user text, as the router sees it.
        utterance: String,
        /// Text sent to the assistant, framed with app context.
        question: String,
        app: AppContext,
        /// Start from a clean history specialized for this app.
        reset: bool,
    },
    PersistApiKey(String),
    Shutdown,
}

/// What to do with a generated notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Show(PetEvent),
    Defer,
}

/// Pure slot-poll projection: cadence of scheduler polls, slot selection and
/// delivery decisions. Holds no notification state of its own.
#[derive(Debug, Clone)]
pub struct Scheduler {
    poll_every: Duration,
    next_poll: Option<NaiveDateTime>,
}

impl Scheduler {
    pub fn new(poll_interval_secs: u64) -> Self {
        Self {
            poll_every: Duration::seconds(poll_interval_secs.max(1) as i64),
            next_poll: None,
        }
    }

    /// True at most once per poll interval. The first call always polls.
    pub fn poll_due(&mut self, now: NaiveDateTime) -> bool {
        match self.next_poll {
            Some(at) if now < at => false,
            _ => {
                self.next_poll = Some(now + self.poll_every);
                true
            }
        }
    }

    /// First pending slot, if the companion is resting and nothing else is
    /// already in flight.
    pub fn pick_slot(&self, posture: PetState, busy: bool, pending: &[SlotId]) -> Option<SlotId> {
        if posture != PetState::Resting || busy {
            return None;
        }
        pending.first().copied()
    }

    /// The guard is re-checked here, at delivery time, not at poll time.
    pub fn delivery(&self, posture: PetState, notification: &Notification) -> Delivery {
        if posture == PetState::Resting {
            Delivery::Show(notice_event(notification.pet_state))
        } else {
            Delivery::Defer
        }
    }
}
