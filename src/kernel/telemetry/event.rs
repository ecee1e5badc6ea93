use serde::{Deserialize, Serialize};

use crate::intent::{ResponseMode, RouteSource};
use crate::kernel::presence::PetState;
use crate::kernel::time::Tick;
use crate::notifications::SlotId;

// Allowed: ids, ticks, enums, scores, counts
// Forbidden: any text the user typed or the model produced

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    PresenceTransition {
        from: PetState,
        to: PetState,
        tick: Tick,
    },

    SlotOutcome {
        slot: SlotId,
        outcome: SlotOutcomeKind,
    },

    ModeRoute {
        source: RouteSource,
        mode: ResponseMode,
        work_score: i32,
        casual_score: i32,
    },

    TurnLifecycle(TurnEventKind),

    Lifecycle(LifecycleEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotOutcomeKind {
    Delivered,
    /// Generated while the user was busy; shown once the companion rests again.
    Deferred,
    Skipped,
    /// Nothing to do: disabled or already resolved by another path.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEventKind {
    Requested,
    Answered,
    Failed,
    /// Result arrived for a turn nobody is waiting for any more.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    OnboardingCompleted,
    OnboardingSkipped,
    Shutdown,
}
