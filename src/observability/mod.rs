//! Observability: structured logging for storage events
//!
//! Logs are synchronous JSON lines with deterministic key ordering so
//! test harnesses and operators can grep them reliably.

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};
