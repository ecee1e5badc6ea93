pub mod router;
pub mod types;

pub use router::{classify_response_mode, IntentRouter};
pub use types::{ModeScores, ResponseMode, RouteDecision, RouteSource};
