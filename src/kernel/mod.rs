pub mod context;
pub mod event;
pub mod presence;
pub mod reactor;
pub mod scheduler;
pub mod telemetry;
pub mod time;
