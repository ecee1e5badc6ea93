use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Animation frame counter. Advanced by the host's render loop, reset on every
/// posture change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Tick {
    pub frame: u64,
}

/// Milliseconds per animation frame.
pub const FRAME_MS: u64 = 160;

/// Idle time after a reply before the host dismisses back to rest.
pub const AUTO_REST_MS: u64 = 15_000;

/// Lifetime of an unanswered alert bubble.
pub const ALERT_DISMISS_MS: u64 = 30_000;

impl Tick {
    pub fn new() -> Self {
        Tick { frame: 0 }
    }

    pub fn next(&self) -> Self {
        Tick { frame: self.frame + 1 }
    }
}

/// Source of local wall-clock time. Slot scheduling works on naive local time
/// so that "today" and "15:00" mean what the user's clock says.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
