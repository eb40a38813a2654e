mod checkin;
mod config;
mod stats;
mod subject;

pub use checkin::*;
pub use config::*;
pub use stats::*;
pub use subject::*;
