use std::collections::VecDeque;

use super::event::{LifecycleEvent, SlotOutcomeKind, TelemetryEvent, TurnEventKind};
use crate::intent::{ResponseMode, RouteSource};
use crate::kernel::presence::PetState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub presence_stats: PresenceStats,
    pub slot_stats: SlotStats,
    pub route_stats: RouteStats,
    pub turn_stats: TurnStats,
    pub onboarding_completed: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceStats {
    pub transitions: u64,
    pub greetings: u64,
    pub returns_to_rest: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotStats {
    pub delivered: u64,
    pub deferred: u64,
    pub skipped: u64,
    pub idle: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteStats {
    pub by_rule: u64,
    pub by_model: u64,
    pub work: u64,
    pub casual: u64,
    pub avg_score_gap: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnStats {
    pub requested: u64,
    pub answered: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();
    let mut gap_total: u64 = 0;

    for event in events {
        match event {
            TelemetryEvent::PresenceTransition { to, .. } => {
                snap.presence_stats.transitions += 1;
                match to {
                    PetState::Greeting => snap.presence_stats.greetings += 1,
                    PetState::Resting => snap.presence_stats.returns_to_rest += 1,
                    _ => {}
                }
            }
            TelemetryEvent::SlotOutcome { outcome, .. } => match outcome {
                SlotOutcomeKind::Delivered => snap.slot_stats.delivered += 1,
                SlotOutcomeKind::Deferred => snap.slot_stats.deferred += 1,
                SlotOutcomeKind::Skipped => snap.slot_stats.skipped += 1,
                SlotOutcomeKind::Idle => snap.slot_stats.idle += 1,
            },
            TelemetryEvent::ModeRoute {
                source,
                mode,
                work_score,
                casual_score,
            } => {
                match source {
                    RouteSource::Rule => snap.route_stats.by_rule += 1,
                    RouteSource::Model => snap.route_stats.by_model += 1,
                }
                match mode {
                    ResponseMode::Work => snap.route_stats.work += 1,
                    ResponseMode::Casual => snap.route_stats.casual += 1,
                }
                gap_total += (work_score - casual_score).unsigned_abs() as u64;
            }
            TelemetryEvent::TurnLifecycle(kind) => match kind {
                TurnEventKind::Requested => snap.turn_stats.requested += 1,
                TurnEventKind::Answered => snap.turn_stats.answered += 1,
                TurnEventKind::Failed => snap.turn_stats.failed += 1,
                TurnEventKind::Dropped => snap.turn_stats.dropped += 1,
            },
            TelemetryEvent::Lifecycle(LifecycleEvent::OnboardingCompleted) => {
                snap.onboarding_completed += 1;
            }
            TelemetryEvent::Lifecycle(_) => {}
        }
    }

    let routes = snap.route_stats.by_rule + snap.route_stats.by_model;
    if routes > 0 {
        snap.route_stats.avg_score_gap = gap_total as f64 / routes as f64;
    }

    snap
}
