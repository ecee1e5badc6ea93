//! In-process telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer. It must **NEVER** be read inside
//! decision logic (FSM, scheduler, router). It exists solely for observability
//! and verification.
//!
//! # PRIVACY INVARIANT
//! Telemetry events must **NEVER** contain user content (questions, replies,
//! generated openers, topic keys). Only enums, slot ids, scores and counts.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::TelemetryEvent;
pub use metrics::TelemetrySnapshot;
pub use recorder::TelemetryRecorder;
