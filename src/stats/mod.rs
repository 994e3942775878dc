//! Hub and room statistics

pub mod metrics;

pub use metrics::{HubStats, RoomStats};
