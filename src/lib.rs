//! Blood bank analytics: daily rollups of donations, requests and inventory, trend
//! reports behind a single-flight cache, report export and chart data.

// Module declarations
pub mod handlers;
pub mod responses;
pub mod services;
pub mod types;
pub mod utils;

pub use services::core::infrastructure::analytics_module::{
    AnalyticsCoordinator, AnalyticsModuleConfig, ChartData, ChartRequest, ExportArtifact,
    ReportResponse,
};
pub use types::{ExportFormat, GroupBy, ReportParameters, ReportRequest, ReportType};
pub use utils::{AnalyticsError, AnalyticsResult, ErrorKind};
