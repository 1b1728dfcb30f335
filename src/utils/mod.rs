// src/utils/mod.rs

pub mod calculations;
pub mod error;
pub mod logger;
pub mod time;

// Re-export commonly used items
pub use calculations::*;
pub use error::{AnalyticsError, AnalyticsResult, ErrorDetails, ErrorKind};
pub use logger::*;
pub use time::{Clock, ManualClock, SystemClock};
