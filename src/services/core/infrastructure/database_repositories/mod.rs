// Database Repositories Module
// Read-only source records and the daily summary store

pub mod analytics_repository;
pub mod source_repository;

pub use analytics_repository::{
    DonationStatsRow, InMemoryStatsRepository, InventorySnapshotRow, RequestStatsRow,
    StatsRepository, StoredJson,
};
pub use source_repository::{InMemorySourceRepository, SourceRepository};
