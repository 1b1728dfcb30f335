// src/services/core/mod.rs

pub mod infrastructure;

// Re-export all services for convenience
pub use infrastructure::*;
