use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, at-most-once-per-day delivery opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotId {
    /// First user activation of the day. No wall-clock gate.
    #[serde(rename = "wake_first")]
    WakeFirst,
    #[serde(rename = "afternoon_1500")]
    Afternoon1500,
    #[serde(rename = "evening_2000")]
    Evening2000,
}

/// Wall-clock slots in declaration order. Pending slots are always reported in
/// this order, never by proximity to now.
pub const TIMED_SLOTS: [SlotId; 2] = [SlotId::Afternoon1500, SlotId::Evening2000];

impl SlotId {
    pub const ALL: [SlotId; 3] = [SlotId::WakeFirst, SlotId::Afternoon1500, SlotId::Evening2000];

    pub fn parse(s: &str) -> Option<SlotId> {
        Self::ALL.into_iter().find(|slot| slot.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotId::WakeFirst => "wake_first",
            SlotId::Afternoon1500 => "afternoon_1500",
            SlotId::Evening2000 => "evening_2000",
        }
    }

    /// Label embedded in the generation prompt.
    pub fn label(&self) -> &'static str {
        match self {
            SlotId::WakeFirst => "first wake-up",
            SlotId::Afternoon1500 => "afternoon 15:00",
            SlotId::Evening2000 => "evening 20:00",
        }
    }

    /// Status line shown under the companion while the notice is up.
    pub fn status_text(&self) -> &'static str {
        match self {
            SlotId::WakeFirst => "Daily chat",
            SlotId::Afternoon1500 => "News update (3 PM)",
            SlotId::Evening2000 => "News update (8 PM)",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse `HH:MM` into `(hour, minute)`. Out-of-range or malformed input is `None`.
pub fn parse_hhmm(hhmm: &str) -> Option<(u32, u32)> {
    let (hh, mm) = hhmm.trim().split_once(':')?;
    let hh: u32 = hh.trim().parse().ok()?;
    let mm: u32 = mm.trim().parse().ok()?;
    if hh > 23 || mm > 59 {
        return None;
    }
    Some((hh, mm))
}

/// True once local time has reached `hhmm` on the current day. A malformed
/// target is never due.
pub fn is_due(now: NaiveDateTime, hhmm: &str) -> bool {
    match parse_hhmm(hhmm) {
        Some(target) => (now.hour(), now.minute()) >= target,
        None => false,
    }
}
