pub mod checkins;
pub mod configs;
pub mod stats;
pub mod subjects;
