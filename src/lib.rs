pub mod config;
pub mod intent;
pub mod kernel;
pub mod notifications;
pub mod services;

// Re-export specific items if needed for convenient access
pub use kernel::reactor::Reactor;
