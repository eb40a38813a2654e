pub mod enrichment;
pub mod escalation;
pub mod lifecycle;
pub mod notify;
pub mod scheduler;
pub mod sweep;

pub use lifecycle::CheckInEngine;
