pub mod quiz;
pub mod topic;

pub use quiz::*;
pub use topic::{Event, Score, Topic};
