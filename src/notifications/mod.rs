pub mod base;
pub mod daily_chat;
pub mod day_record;
pub mod manager;
pub mod payload;
pub mod slots;
pub mod state;

pub use base::{Notification, NotificationSource};
pub use daily_chat::DailyChatSource;
pub use day_record::{load_day, DayRecord, SlotStatus};
pub use manager::NotificationManager;
pub use slots::SlotId;
pub use state::NotificationState;
